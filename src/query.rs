//! Read API over the history store

use std::sync::Arc;

use crate::store::{HistoryStore, StoreResult};
use crate::types::{HistoryEntry, DEFAULT_LIMIT};

/// Point-in-time reads for polling clients
#[derive(Debug, Clone)]
pub struct QueryService {
    store: Arc<dyn HistoryStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Most recent entries, newest first. `None` reads [`DEFAULT_LIMIT`] entries.
    pub async fn latest(&self, limit: Option<i64>) -> StoreResult<Vec<HistoryEntry>> {
        self.store.latest(limit.unwrap_or(DEFAULT_LIMIT)).await
    }
}
