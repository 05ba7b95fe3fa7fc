use std::{str::FromStr, time::Duration};

use serde::Serialize;
use sqlx::{
    FromRow, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tracing::info;

use crate::Config;

// unique: accounts.uid, accounts.email
// unique: profiles.username
// unique: conversations.key (sorted "a:b")
// unique: unread (conversation_key, username)
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        uid TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS profiles (
        uid TEXT PRIMARY KEY REFERENCES accounts(uid),
        username TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS conversations (
        key TEXT PRIMARY KEY,
        participant_a TEXT NOT NULL,
        participant_b TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS conversations_a ON conversations (participant_a)",
    "CREATE INDEX IF NOT EXISTS conversations_b ON conversations (participant_b)",
    "CREATE TABLE IF NOT EXISTS messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        conversation_key TEXT NOT NULL REFERENCES conversations(key),
        sender TEXT NOT NULL,
        text TEXT NOT NULL,
        sent_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS messages_conversation ON messages (conversation_key, seq)",
    "CREATE TABLE IF NOT EXISTS unread (
        conversation_key TEXT NOT NULL REFERENCES conversations(key),
        username TEXT NOT NULL,
        count INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (conversation_key, username)
    )",
];

/// How long a writer waits for the database lock before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn connect(config: &Config) -> anyhow::Result<SqlitePool> {
    info!("Connecting to {}", config.database_url);
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(config.db_connections)
        .connect_with(options)
        .await?;

    migrate(&db_pool).await?;
    Ok(db_pool)
}

/// Creates any missing tables. Safe to run on every start.
pub async fn migrate(db_pool: &SqlitePool) -> sqlx::Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db_pool).await?;
    }
    Ok(())
}

/// Single-connection in-memory database, migrated. Each call is a fresh database.
pub async fn memory() -> sqlx::Result<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    migrate(&db_pool).await?;
    Ok(db_pool)
}

pub fn now_millis() -> i64 {
    let now = time::OffsetDateTime::now_utc();
    (now.unix_timestamp_nanos() / 1_000_000) as i64
}

#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub uid: String,
    /// PHC string, algorithm and salt included.
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Profile {
    pub uid: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub text: String,
    pub sent_at: i64,
}
