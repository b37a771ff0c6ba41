//! Shared state for the HTTP and WebSocket handlers

use std::sync::Arc;
use std::time::Duration;

use super::broadcaster::LiveBroadcaster;
use crate::query::QueryService;
use crate::store::HistoryStore;

/// Shared application state for HTTP and WebSocket handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Read API over the store
    pub query: QueryService,

    /// Registry of live connections
    pub broadcaster: LiveBroadcaster,

    /// Interval between server pings on live connections
    pub heartbeat_interval: Duration,

    store: Arc<dyn HistoryStore>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        broadcaster: LiveBroadcaster,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            query: QueryService::new(Arc::clone(&store)),
            broadcaster,
            heartbeat_interval,
            store,
        }
    }

    /// Store handle for health probes
    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }
}
