//! WebSocket connection handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tokio::time::{interval_at, Instant};

use super::events::{ClientMessage, LiveMessage, PongMessage};
use super::state::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut live = match state.broadcaster.connect().await {
        Ok(live) => live,
        Err(err) => {
            tracing::error!(error = %err, "rejecting live connection");
            let frame = CloseFrame {
                code: close_code::ERROR,
                reason: "history unavailable".into(),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    let period = state.heartbeat_interval;
    let mut heartbeat = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            // Snapshot first, then updates
            message = live.recv() => {
                match message {
                    Some(message) => {
                        if send_live(&mut socket, &message).await.is_err() {
                            break; // Client disconnected
                        }
                    }
                    None => break,
                }
            }

            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            // Handle client messages
            result = socket.recv() => {
                match result {
                    Some(Ok(msg)) => {
                        if !handle_client_message(msg, &mut socket).await {
                            break; // Client requested close or error
                        }
                    }
                    Some(Err(_)) => break, // WebSocket error
                    None => break, // Client disconnected
                }
            }
        }
    }

    tracing::debug!(connection = live.id(), "live connection closed");
}

async fn send_live(socket: &mut WebSocket, message: &LiveMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => socket.send(Message::Text(json)).await,
        Err(err) => {
            // Entries are plain JSON; this only fires on a serializer bug
            tracing::error!(error = %err, "failed to encode live message");
            Ok(())
        }
    }
}

/// Handle a message from the client
/// Returns false if the connection should be closed
async fn handle_client_message(msg: Message, socket: &mut WebSocket) -> bool {
    match msg {
        Message::Text(text) => {
            if let Ok(ClientMessage::Ping) = serde_json::from_str::<ClientMessage>(&text) {
                if let Ok(json) = serde_json::to_string(&PongMessage::default()) {
                    return socket.send(Message::Text(json)).await.is_ok();
                }
            }
            true
        }
        Message::Binary(_) => true, // Ignore binary messages
        Message::Ping(data) => socket.send(Message::Pong(data)).await.is_ok(),
        Message::Pong(_) => true,
        Message::Close(_) => false, // Client requested close
    }
}
