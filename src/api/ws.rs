//! WebSocket notification stream.
//!
//! Each connection registers a channel-backed observer with the fanout and
//! forwards every event as a JSON text frame. The observer is unregistered
//! when either side closes.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use super::handlers::ApiState;
use crate::notify::ChannelObserver;

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

async fn client_session(socket: WebSocket, state: ApiState) {
    let fanout = Arc::clone(state.pipeline.fanout());
    let (observer, mut events) = ChannelObserver::pair(state.config.notifications.observer_buffer);
    let observer_id = fanout.register(Arc::new(observer));
    info!(observer = %observer_id, total = fanout.len(), "Dashboard client connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to encode notification");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames are ignored; the loop only watches for close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    fanout.unregister(observer_id);
    debug!(observer = %observer_id, "Observer released");
    info!(total = fanout.len(), "Dashboard client disconnected");
}
