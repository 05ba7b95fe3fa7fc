use axum::{
    Form, debug_handler,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{AppResult, session};

use super::login::{AuthForm, render};

#[derive(Deserialize)]
pub(crate) struct SignupForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    username: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn signup(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Form(SignupForm { email, password, username }): Form<SignupForm>,
) -> AppResult<Response> {
    match super::create_account(&db_pool, &email, &password, &username).await {
        Ok(profile) => {
            session::sign_in(&session, &profile.username).await?;
            Ok(Redirect::to("/dashboard").into_response())
        }
        Err(err) if err.is_form_error() => {
            Ok((err.status(), render(AuthForm::Signup, Some(&err.to_string()), &email, &username)).into_response())
        }
        Err(err) => Err(err),
    }
}
