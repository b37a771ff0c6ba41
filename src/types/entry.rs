//! History entry, the only record the relay persists

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One classification result as stored and served by the relay.
///
/// Entries are immutable once created. `id` is assigned by the producer
/// and doubles as the deduplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryEntry {
    pub id: String,
    #[serde(default)]
    pub prompt: Option<String>,
    pub result: Value,
    pub source_ref: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Create an entry without a prompt
    pub fn new(
        id: impl Into<String>,
        result: Value,
        source_ref: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: None,
            result,
            source_ref: source_ref.into(),
            timestamp,
        }
    }

    /// Attach the prompt that produced this result
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// Newest first, ties broken by id so reads are deterministic.
pub fn newest_first(a: &HistoryEntry, b: &HistoryEntry) -> std::cmp::Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| b.id.cmp(&a.id))
}
