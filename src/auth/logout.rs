use axum::{debug_handler, response::Redirect};
use tower_sessions::Session;
use tracing::debug;

use crate::{AppResult, session};

#[debug_handler]
pub(crate) async fn logout(session: Session) -> AppResult<Redirect> {
    if let Some(user) = session::signed_in(&session).await? {
        debug!("goodbye @{}", user.username);
    }
    session::sign_out(&session).await?;
    Ok(Redirect::to("/"))
}
