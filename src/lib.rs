pub mod auth;
pub mod config;
pub mod conversations;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod events;
pub mod res;
pub mod session;
pub mod users;

use std::{ops::Deref, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::FromRef,
    http::{Method, header::CONTENT_TYPE},
    response::{Html, IntoResponse},
    routing::{get, post},
};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::Config;
pub use error::{AppError, AppResult};
pub use events::Hub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub hub: Hub,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config) -> Self {
        Self {
            db_pool,
            hub: Hub::new(config.event_capacity),
            config: Arc::new(config),
        }
    }
}

/// Every route the application serves. Session handling is layered on by the caller.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(dashboard::landing))
        .route("/dashboard", get(dashboard::dashboard))
        .route("/ws", get(events::ws::subscribe))
        .route("/style.css", get(res::stylesheet))
        .merge(auth::router())
        .nest("/users", users::router())
        .route("/chats", post(conversations::routes::start_chat))
        .route(
            "/chats/{username}",
            get(conversations::routes::open_thread).post(conversations::routes::send_message),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Renders a message body as Markdown. Raw HTML in the source is shown as text.
pub struct Markdown<T>(pub T);

impl<T> Markdown<T>
where
    T: Deref<Target = str>,
{
    pub fn to_html(&self) -> String {
        use pulldown_cmark::{Event, Options, Parser};

        let parser = Parser::new_ext(&self.0, Options::ENABLE_STRIKETHROUGH)
            .map(|event| match event {
                Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
                _ => event,
            });

        let mut html_output = String::new();
        pulldown_cmark::html::push_html(&mut html_output, parser);
        html_output
    }
}

impl<T> IntoResponse for Markdown<T>
where
    T: Deref<Target = str>,
{
    fn into_response(self) -> axum::response::Response {
        Html(self.to_html()).into_response()
    }
}
