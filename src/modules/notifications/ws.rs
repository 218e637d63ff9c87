use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::hub::LiveHub;
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

#[utoipa::path(
    get,
    path = "/api/v1/ws",
    responses((status = 101, description = "Switching to a live update stream")),
    tag = "Notifications"
)]
pub async fn live_updates(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: LiveHub) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = hub.subscribe();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    let mut awaiting_pong = false;

    debug!("Live update client connected");

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => awaiting_pong = false,
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    // Clients only listen.
                    Some(Ok(_)) => {}
                }
            }

            update = updates.recv() => {
                match update {
                    Ok(update) => {
                        let text = match serde_json::to_string(&update) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(video_id = %update.video_id(), "Failed to encode live update: {}", e);
                                continue;
                            }
                        };
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Live update client lagged by {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = heartbeat.tick() => {
                if awaiting_pong {
                    debug!("Client failed to respond to ping, closing connection");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }
        }
    }

    debug!("Live update client disconnected");
}
