use tower_sessions::Session;

use crate::{AppError, AppResult};

pub const USERNAME: &str = "username";

/// Who is signed in on this session, if anyone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIn {
    pub username: String,
}

pub async fn signed_in(session: &Session) -> AppResult<Option<SignedIn>> {
    Ok(session
        .get::<String>(USERNAME)
        .await?
        .map(|username| SignedIn { username }))
}

pub async fn require(session: &Session) -> AppResult<SignedIn> {
    signed_in(session).await?.ok_or(AppError::NotSignedIn)
}

pub async fn sign_in(session: &Session, username: &str) -> AppResult<()> {
    session.cycle_id().await?;
    session.insert(USERNAME, username).await?;
    Ok(())
}

pub async fn sign_out(session: &Session) -> AppResult<()> {
    session.flush().await?;
    Ok(())
}
