//! WebSocket route handler
//!
//! Streams newly stored entries and change notifications to the client
//! until either side closes the connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use newsfeed_core::{ChangeEvent, NewsEntry};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::AppState;

/// Message pushed to WebSocket clients
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage<'a> {
    Entry { entry: &'a NewsEntry },
    Change { event: &'a ChangeEvent },
}

/// Create WebSocket routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (entry_registration, mut entries) = state.broadcaster.register_channel();
    let (change_registration, mut changes) = state.notifier.subscribe_channel();

    loop {
        let outgoing = tokio::select! {
            Some(entry) = entries.recv() => {
                serde_json::to_string(&ServerMessage::Entry { entry: &entry })
            }
            Some(event) = changes.recv() => {
                serde_json::to_string(&ServerMessage::Change { event: &event })
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!("WebSocket receive error: {}", e);
                    break;
                }
            },
            else => break,
        };

        let text = match outgoing {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode WebSocket message: {}", e);
                continue;
            }
        };
        if sender.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }

    entry_registration.cancel();
    change_registration.cancel();
    info!("WebSocket connection closed");
}
