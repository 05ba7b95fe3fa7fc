use axum::{
    Form, Json, debug_handler,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::debug;

use crate::{AppError, AppResult, auth, events::Hub, session};

use super::SendOutcome;

#[derive(Deserialize)]
pub(crate) struct StartChatForm {
    #[serde(default)]
    username: String,
}

#[derive(Deserialize)]
pub(crate) struct SendMessageForm {
    #[serde(default)]
    text: String,
}

fn open_url(username: &str) -> String {
    format!("/dashboard?with={username}")
}

/// Path and form usernames end up in redirects, so anything that can't be a display name is unknown.
fn known_shape(username: &str) -> AppResult<()> {
    auth::validate_username(username).map_err(|_| AppError::UnknownUser(username.to_owned()))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn start_chat(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
    Form(StartChatForm { username }): Form<StartChatForm>,
) -> AppResult<Redirect> {
    let me = session::require(&session).await?;
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::MissingFields);
    }
    known_shape(username)?;

    super::start(&db_pool, &hub, &me.username, username).await?;
    Ok(Redirect::to(&open_url(username)))
}

/// Thread as JSON. Opening it counts as reading it.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn open_thread(
    Path(username): Path<String>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
) -> AppResult<Response> {
    let me = session::require(&session).await?;
    if !super::mark_read(&db_pool, &hub, &me.username, &username).await? {
        return Err(AppError::NoConversation(username));
    }

    let thread = super::thread(&db_pool, &me.username, &username)
        .await?
        .ok_or(AppError::NoConversation(username))?;
    Ok(Json(thread).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn send_message(
    Path(username): Path<String>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
    Form(SendMessageForm { text }): Form<SendMessageForm>,
) -> AppResult<Redirect> {
    let me = session::require(&session).await?;
    known_shape(&username)?;

    let sent = super::send(&db_pool, &hub, &me.username, &username, &text).await;
    back_to_thread(sent, &me.username, &username)
}

/// Whatever happened to the message, the composer goes back to the thread;
/// only internal failures surface as an error page.
fn back_to_thread(sent: AppResult<SendOutcome>, me: &str, to: &str) -> AppResult<Redirect> {
    match sent {
        Ok(SendOutcome::Sent(message)) => debug!("@{me} -> @{to}: {}", message.id),
        Ok(SendOutcome::NoConversation) => {}
        Err(err) if err.is_form_error() => debug!("@{me} -> @{to} not sent: {err}"),
        Err(err) => return Err(err),
    }
    Ok(Redirect::to(&open_url(to)))
}
