use axum::{
    Json, Router, debug_handler,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{AppResult, AppState, Config, session};

pub fn router() -> Router<AppState> {
    Router::new().route("/search", get(search_handler))
}

#[derive(Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// Display names starting with `query`, excluding `me`, alphabetically.
pub async fn search(db_pool: &SqlitePool, query: &str, me: &str, limit: u32) -> AppResult<Vec<String>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let pattern = format!("{}%", escape_like(query));
    let rows: Vec<(String,)> = sqlx::query_as(
        r"SELECT username FROM profiles WHERE username LIKE ? ESCAPE '\' AND username != ? ORDER BY username LIMIT ?",
    )
    .bind(pattern)
    .bind(me)
    .bind(limit)
    .fetch_all(db_pool)
    .await?;
    Ok(rows.into_iter().map(|(username,)| username).collect())
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[debug_handler(state = AppState)]
pub(crate) async fn search_handler(
    Query(SearchQuery { q }): Query<SearchQuery>,
    State(db_pool): State<SqlitePool>,
    State(config): State<std::sync::Arc<Config>>,
    session: Session,
) -> AppResult<Json<Vec<String>>> {
    let me = session::require(&session).await?;
    Ok(Json(search(&db_pool, &q, &me.username, config.search_limit).await?))
}
