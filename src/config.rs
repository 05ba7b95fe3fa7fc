use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub db_connections: u32,
    pub session_minutes: i64,
    pub event_capacity: usize,
    pub search_limit: u32,
    pub secure_cookies: bool,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn load() -> anyhow::Result<Self> {
        if dotenv::dotenv().is_err() {
            info!("No .env file found, reading the environment only");
        }

        Ok(Self {
            port: try_load("LOOP_PORT", "8080")?,
            database_url: try_load("DATABASE_URL", "sqlite://loop.db?mode=rwc")?,
            db_connections: try_load("LOOP_DB_CONNECTIONS", "16")?,
            session_minutes: try_load("LOOP_SESSION_MINUTES", "60")?,
            event_capacity: try_load("LOOP_EVENT_CAPACITY", "64")?,
            search_limit: try_load("LOOP_SEARCH_LIMIT", "10")?,
            secure_cookies: try_load("LOOP_SECURE_COOKIES", "false")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "sqlite::memory:".to_owned(),
            db_connections: 1,
            session_minutes: 60,
            event_capacity: 64,
            search_limit: 10,
            secure_cookies: false,
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let value = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        anyhow::anyhow!("environment variable {key} is misconfigured: {e}")
    })
}
