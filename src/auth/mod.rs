//! Accounts: email + password credentials with a unique display name.
//!
//! Credentials live in `accounts`, the display name in `profiles`; both rows
//! share a generated uid. A username is checked before anything is written, and
//! the `UNIQUE` constraint catches the rare signup that races past the check.
mod login;
mod logout;
mod password;
mod signup;

use axum::{
    Router,
    routing::{get, post},
};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{AppError, AppResult, AppState, db::{self, AccountRow, Profile}};

pub use password::MIN_PASSWORD_LEN;

pub const MAX_USERNAME_LEN: usize = 32;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login::login_page).post(login::login))
        .route("/signup", post(signup::signup))
        .route("/logout", post(logout::logout))
}

/// Display names appear in conversation keys and URLs, so only `[A-Za-z0-9._-]` is allowed.
pub fn validate_username(username: &str) -> AppResult<()> {
    let ok = !username.is_empty()
        && username.chars().count() <= MAX_USERNAME_LEN
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        Err(AppError::InvalidUsername(MAX_USERNAME_LEN))
    }
}

fn validate_email(email: &str) -> AppResult<()> {
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace) => Ok(()),
        _ => Err(AppError::InvalidEmail),
    }
}

pub async fn username_exists(db_pool: &SqlitePool, username: &str) -> AppResult<bool> {
    Ok(sqlx::query("SELECT 1 FROM profiles WHERE username=?")
        .bind(username)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

async fn email_exists(db_pool: &SqlitePool, email: &str) -> AppResult<bool> {
    Ok(sqlx::query("SELECT 1 FROM accounts WHERE email=?")
        .bind(email)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

pub async fn create_account(
    db_pool: &SqlitePool,
    email: &str,
    password: &str,
    username: &str,
) -> AppResult<Profile> {
    let email = email.trim().to_lowercase();
    let username = username.trim();
    if email.is_empty() || password.is_empty() || username.is_empty() {
        return Err(AppError::MissingFields);
    }
    validate_email(&email)?;
    validate_username(username)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::WeakPassword(MIN_PASSWORD_LEN));
    }

    if username_exists(db_pool, username).await? {
        debug!("signup rejected, @{username} is taken");
        return Err(AppError::UsernameTaken);
    }
    if email_exists(db_pool, &email).await? {
        return Err(AppError::EmailTaken);
    }

    let uid = Uuid::now_v7().to_string();
    let password_hash = hash_password(password.to_owned()).await?;

    let mut tx = db_pool.begin().await?;
    sqlx::query("INSERT INTO accounts (uid,email,password_hash,created_at) VALUES (?,?,?,?)")
        .bind(&uid)
        .bind(&email)
        .bind(&password_hash)
        .bind(db::now_millis())
        .execute(&mut *tx)
        .await
        .map_err(unique_violation)?;
    sqlx::query("INSERT INTO profiles (uid,username) VALUES (?,?)")
        .bind(&uid)
        .bind(username)
        .execute(&mut *tx)
        .await
        .map_err(unique_violation)?;
    tx.commit().await?;

    info!("adding @{username}#{uid}");
    Ok(Profile {
        uid,
        username: username.to_owned(),
    })
}

// Argon2 is CPU-bound, so it runs on the blocking pool.
async fn hash_password(plain: String) -> AppResult<String> {
    Ok(tokio::task::spawn_blocking(move || password::hash(&plain))
        .await
        .map_err(anyhow::Error::from)??)
}

fn unique_violation(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            if db_err.message().contains("profiles.username") {
                AppError::UsernameTaken
            } else {
                AppError::EmailTaken
            }
        }
        _ => err.into(),
    }
}

pub async fn sign_in(db_pool: &SqlitePool, email: &str, password: &str) -> AppResult<Profile> {
    let email = email.trim().to_lowercase();
    let account: Option<AccountRow> = sqlx::query_as(
        "SELECT uid,password_hash FROM accounts WHERE email=?",
    )
    .bind(&email)
    .fetch_optional(db_pool)
    .await?;

    let Some(AccountRow { uid, password_hash }) = account else {
        return Err(AppError::InvalidCredentials);
    };
    let candidate = password.to_owned();
    let matches = tokio::task::spawn_blocking(move || password::verify(&password_hash, &candidate))
        .await
        .map_err(anyhow::Error::from)?;
    if !matches {
        return Err(AppError::InvalidCredentials);
    }

    let profile: Profile = sqlx::query_as("SELECT uid,username FROM profiles WHERE uid=?")
        .bind(&uid)
        .fetch_one(db_pool)
        .await?;
    info!("welcome @{}#{}", profile.username, profile.uid);
    Ok(profile)
}
