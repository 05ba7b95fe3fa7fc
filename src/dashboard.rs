use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    AppResult, Config, Markdown, auth,
    conversations::{self, ConversationSummary, Thread},
    events::Hub,
    include_res, res, session, users,
};

#[derive(Deserialize)]
pub(crate) struct DashboardQuery {
    with: Option<String>,
    q: Option<String>,
}

#[debug_handler]
pub async fn landing(session: Session) -> AppResult<Response> {
    if session::signed_in(&session).await?.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    Ok(Html(include_res!(str, "/pages/landing.html")).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn dashboard(
    Query(DashboardQuery { with, q }): Query<DashboardQuery>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    State(config): State<Arc<Config>>,
    session: Session,
) -> AppResult<Response> {
    let Some(me) = session::signed_in(&session).await? else {
        return Ok(Redirect::to("/").into_response());
    };

    let open_with = with
        .as_deref()
        .filter(|w| *w != me.username && auth::validate_username(w).is_ok());
    let mut thread = None;
    if let Some(other) = open_with {
        if conversations::mark_read(&db_pool, &hub, &me.username, other).await? {
            thread = conversations::thread(&db_pool, &me.username, other).await?;
        }
    }

    let conversation_items = conversations::list_for(&db_pool, &me.username)
        .await?
        .iter()
        .map(|summary| conversation_item(summary, thread.as_ref()))
        .collect::<String>();

    let search_query = q.unwrap_or_default();
    let search_results = users::search(&db_pool, &search_query, &me.username, config.search_limit)
        .await?
        .iter()
        .map(|username| include_res!(str, "/pages/search_result.html").replace("{username}", &res::escape(username)))
        .collect::<String>();

    let thread_html = match (&thread, with.as_deref()) {
        (Some(thread), _) => thread_panel(thread, &me.username),
        (None, Some(other)) if !other.is_empty() => format!(
            "<p class=\"notice\">No conversation with {} yet. Search for them to start one.</p>",
            res::escape(other)
        ),
        _ => "<p class=\"notice\">Pick a conversation.</p>".to_owned(),
    };

    Ok(Html(
        include_res!(str, "/pages/dashboard.html")
            .replace("{username}", &res::escape(&me.username))
            .replace("{search_query}", &res::escape(&search_query))
            .replace("{search_results}", &search_results)
            .replace("{conversation_items}", &conversation_items)
            .replace("{thread}", &thread_html),
    )
    .into_response())
}

fn conversation_item(summary: &ConversationSummary, open: Option<&Thread>) -> String {
    let active = open.is_some_and(|thread| thread.key == summary.key);
    let badge_hidden = if summary.unread > 0 && !active { "" } else { " hidden" };

    include_res!(str, "/pages/conversation_item.html")
        .replace("{key}", &res::escape(&summary.key))
        .replace("{with}", &res::escape(&summary.with_user))
        .replace("{active}", if active { "active" } else { "" })
        .replace("{badge_hidden}", badge_hidden)
        .replace("{unread}", &summary.unread.to_string())
}

fn thread_panel(thread: &Thread, me: &str) -> String {
    let other = thread.pair.other(me).unwrap_or_default();

    let messages = thread
        .messages
        .iter()
        .map(|message| {
            include_res!(str, "/pages/message.html")
                .replace("{side}", if message.sender == me { "mine" } else { "theirs" })
                .replace("{id}", &message.id)
                .replace("{sender}", &res::escape(&message.sender))
                .replace("{content}", &Markdown(message.text.as_str()).to_html())
        })
        .collect::<String>();

    include_res!(str, "/pages/thread.html")
        .replace("{key}", &res::escape(&thread.key))
        .replace("{with}", &res::escape(other))
        .replace("{messages}", &messages)
}
