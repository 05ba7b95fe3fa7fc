use axum::{
    Form, debug_handler,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{AppResult, include_res, res, session};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum AuthForm {
    #[default]
    Login,
    Signup,
}

#[derive(Deserialize)]
pub(crate) struct LoginPageQuery {
    #[serde(default)]
    form: AuthForm,
}

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub(super) fn render(form: AuthForm, error: Option<&str>, email: &str, username: &str) -> Html<String> {
    let (login_error, signup_error) = match form {
        AuthForm::Login => (error.unwrap_or(""), ""),
        AuthForm::Signup => ("", error.unwrap_or("")),
    };
    let hidden = |shown: bool| if shown { "" } else { "hidden" };

    Html(
        include_res!(str, "/pages/login.html")
            .replace("{login_hidden}", hidden(form == AuthForm::Login))
            .replace("{signup_hidden}", hidden(form == AuthForm::Signup))
            .replace("{login_error}", &res::escape(login_error))
            .replace("{signup_error}", &res::escape(signup_error))
            .replace("{email}", &res::escape(email))
            .replace("{username}", &res::escape(username)),
    )
}

#[debug_handler]
pub(crate) async fn login_page(
    Query(LoginPageQuery { form }): Query<LoginPageQuery>,
    session: Session,
) -> AppResult<Response> {
    if session::signed_in(&session).await?.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    Ok(render(form, None, "", "").into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Form(LoginForm { email, password }): Form<LoginForm>,
) -> AppResult<Response> {
    match super::sign_in(&db_pool, &email, &password).await {
        Ok(profile) => {
            session::sign_in(&session, &profile.username).await?;
            Ok(Redirect::to("/dashboard").into_response())
        }
        Err(err) if err.is_form_error() => Ok((
            StatusCode::UNAUTHORIZED,
            render(AuthForm::Login, Some(&err.to_string()), &email, ""),
        )
            .into_response()),
        Err(err) => Err(err),
    }
}
