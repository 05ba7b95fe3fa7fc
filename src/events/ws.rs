use axum::{
    debug_handler,
    extract::{State, WebSocketUpgrade, ws::Message},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::{debug, warn};

use crate::{AppResult, conversations, session};

use super::Hub;

/// What a client may send over the socket.
#[derive(Debug, Deserialize)]
pub(crate) struct WsSend {
    to: String,
    text: String,
}

/// Change subscription for the signed-in user. Incoming text frames are `{to, text}` sends.
#[debug_handler(state = crate::AppState)]
pub async fn subscribe(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let me = session::require(&session).await?.username;

    Ok(ws
        .on_upgrade(async move |stream| {
            let mut subscription = hub.subscribe(me.clone());
            let (mut sender, mut receiver) = stream.split();

            let mut broadcast_task = tokio::spawn(async move {
                while let Some(event) = subscription.next().await {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("couldn't encode event: {e}");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    _ = &mut broadcast_task => break,
                    msg = receiver.next() => {
                        let Some(Ok(msg)) = msg else {
                            break;
                        };
                        if let Message::Close(_) = msg {
                            break;
                        }
                        let Ok(WsSend { to, text }) = serde_json::from_slice(&msg.into_data()) else {
                            continue;
                        };

                        if let Err(e) = conversations::send(&db_pool, &hub, &me, &to, &text).await {
                            warn!("@{me} couldn't send to @{to}: {e}");
                        }
                    }
                }
            }

            broadcast_task.abort();
            debug!("@{me} unsubscribed");
        })
        .into_response())
}
