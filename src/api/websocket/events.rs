//! WebSocket message types for live history updates

use serde::{Deserialize, Serialize};

use crate::types::HistoryEntry;

/// Messages pushed to live connections.
///
/// Serialized as `{"type": "snapshot", "data": [...]}` and
/// `{"type": "update", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LiveMessage {
    /// Most recent entries, sent once when the connection opens
    Snapshot(Vec<HistoryEntry>),

    /// A newly persisted entry
    Update(HistoryEntry),
}

/// Client message types
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ping for heartbeat
    Ping,
}

/// Pong response message
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PongMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
}

impl Default for PongMessage {
    fn default() -> Self {
        Self {
            msg_type: "pong".to_string(),
        }
    }
}
