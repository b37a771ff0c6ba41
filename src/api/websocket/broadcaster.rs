//! Live connection registry and fan-out
//!
//! The broadcaster is an explicit object owned by the process and handed to
//! both the consumer and the HTTP layer. Each live connection gets a bounded
//! queue; pushes are best-effort:
//!
//! - a closed connection is dropped from the registry on the next broadcast
//! - a full queue loses that update for that connection only
//!
//! A connection is registered before its snapshot is read, so nothing
//! persisted after connect time can fall between snapshot and updates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::events::LiveMessage;
use crate::config::LiveConfig;
use crate::store::{HistoryStore, StoreError};
use crate::types::HistoryEntry;

/// Identifier of a registered live connection
pub type ConnectionId = u64;

#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("failed to load snapshot: {0}")]
    Snapshot(#[from] StoreError),
}

struct Registry {
    store: Arc<dyn HistoryStore>,
    connections: Mutex<HashMap<ConnectionId, mpsc::Sender<LiveMessage>>>,
    next_id: AtomicU64,
    snapshot_size: i64,
    buffer: usize,
}

/// Fan-out of new entries to every open live connection
#[derive(Clone)]
pub struct LiveBroadcaster {
    registry: Arc<Registry>,
}

impl std::fmt::Debug for LiveBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveBroadcaster")
            .field("connection_count", &self.connection_count())
            .field("snapshot_size", &self.registry.snapshot_size)
            .finish()
    }
}

impl LiveBroadcaster {
    /// Create a broadcaster that reads snapshots from `store`
    pub fn new(store: Arc<dyn HistoryStore>, config: &LiveConfig) -> Self {
        Self {
            registry: Arc::new(Registry {
                store,
                connections: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                snapshot_size: config.snapshot_size,
                buffer: config.connection_buffer.max(1),
            }),
        }
    }

    /// Register a new connection and load its snapshot.
    ///
    /// The returned connection yields the snapshot first, then updates.
    /// If the snapshot cannot be read the connection is unregistered again.
    pub async fn connect(&self) -> Result<LiveConnection, LiveError> {
        let id = self.registry.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.registry.buffer);
        self.registry.connections.lock().insert(id, tx);

        let registration = Registration {
            id,
            registry: Arc::clone(&self.registry),
        };

        let snapshot = self.registry.store.latest(self.registry.snapshot_size).await?;
        tracing::debug!(connection = id, entries = snapshot.len(), "live connection opened");

        Ok(LiveConnection {
            id,
            snapshot: Some(snapshot),
            rx,
            _registration: registration,
        })
    }

    /// Send an update to every registered connection.
    ///
    /// Returns the number of connections the update was queued for.
    /// Failures are per connection and never reach the caller.
    pub fn broadcast(&self, entry: &HistoryEntry) -> usize {
        let message = LiveMessage::Update(entry.clone());
        let mut delivered = 0;
        let mut closed = Vec::new();

        let mut connections = self.registry.connections.lock();
        for (id, tx) in connections.iter() {
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection = *id,
                        entry = %entry.id,
                        "live connection is behind, update dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            connections.remove(&id);
            tracing::debug!(connection = id, "removed closed live connection");
        }

        delivered
    }

    /// Number of currently registered connections
    pub fn connection_count(&self) -> usize {
        self.registry.connections.lock().len()
    }
}

/// Removes the connection from the registry when dropped
struct Registration {
    id: ConnectionId,
    registry: Arc<Registry>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.connections.lock().remove(&self.id);
    }
}

/// Receiving side of one live connection
pub struct LiveConnection {
    id: ConnectionId,
    snapshot: Option<Vec<HistoryEntry>>,
    rx: mpsc::Receiver<LiveMessage>,
    _registration: Registration,
}

impl std::fmt::Debug for LiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConnection")
            .field("id", &self.id)
            .field("snapshot_pending", &self.snapshot.is_some())
            .finish()
    }
}

impl LiveConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next message for this connection; the snapshot always comes first.
    ///
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<LiveMessage> {
        if let Some(snapshot) = self.snapshot.take() {
            return Some(LiveMessage::Snapshot(snapshot));
        }
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryHistoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn entry(id: &str, offset_secs: i64) -> HistoryEntry {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts = base + Duration::seconds(offset_secs);
        HistoryEntry::new(id, json!({}), format!("ref/{}", id), ts)
    }

    fn broadcaster_with(store: Arc<MemoryHistoryStore>, config: LiveConfig) -> LiveBroadcaster {
        LiveBroadcaster::new(store, &config)
    }

    #[tokio::test]
    async fn test_snapshot_is_first_message() {
        let store = Arc::new(MemoryHistoryStore::new());
        store.insert(&entry("old", 0)).await.unwrap();
        let broadcaster = broadcaster_with(store, LiveConfig::default());

        let mut conn = broadcaster.connect().await.unwrap();
        broadcaster.broadcast(&entry("new", 10));

        match conn.recv().await.unwrap() {
            LiveMessage::Snapshot(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].id, "old");
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
        assert_eq!(conn.recv().await.unwrap(), LiveMessage::Update(entry("new", 10)));
    }

    #[tokio::test]
    async fn test_snapshot_respects_size() {
        let store = Arc::new(MemoryHistoryStore::new());
        for i in 0..5 {
            store.insert(&entry(&format!("e{}", i), i)).await.unwrap();
        }
        let config = LiveConfig {
            snapshot_size: 2,
            ..LiveConfig::default()
        };
        let broadcaster = broadcaster_with(store, config);

        let mut conn = broadcaster.connect().await.unwrap();
        let Some(LiveMessage::Snapshot(entries)) = conn.recv().await else {
            panic!("expected snapshot");
        };
        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e4", "e3"]);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_connections() {
        let store = Arc::new(MemoryHistoryStore::new());
        let broadcaster = broadcaster_with(store, LiveConfig::default());
        let mut conns = Vec::new();
        for _ in 0..3 {
            conns.push(broadcaster.connect().await.unwrap());
        }

        assert_eq!(broadcaster.broadcast(&entry("x", 0)), 3);

        for conn in conns.iter_mut() {
            assert!(matches!(conn.recv().await, Some(LiveMessage::Snapshot(_))));
            assert_eq!(conn.recv().await.unwrap(), LiveMessage::Update(entry("x", 0)));
        }
    }

    #[tokio::test]
    async fn test_dropped_connection_is_unregistered() {
        let store = Arc::new(MemoryHistoryStore::new());
        let broadcaster = broadcaster_with(store, LiveConfig::default());
        let kept = broadcaster.connect().await.unwrap();
        let dropped = broadcaster.connect().await.unwrap();
        assert_eq!(broadcaster.connection_count(), 2);

        drop(dropped);
        assert_eq!(broadcaster.connection_count(), 1);
        assert_eq!(broadcaster.broadcast(&entry("x", 0)), 1);
        drop(kept);
        assert_eq!(broadcaster.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_only_affects_slow_connection() {
        let config = LiveConfig {
            connection_buffer: 1,
            ..LiveConfig::default()
        };
        let broadcaster = broadcaster_with(Arc::new(MemoryHistoryStore::new()), config);
        let mut slow = broadcaster.connect().await.unwrap();
        let mut fast = broadcaster.connect().await.unwrap();

        assert_eq!(broadcaster.broadcast(&entry("a", 0)), 2);
        // fast drains, slow does not
        assert!(matches!(fast.recv().await, Some(LiveMessage::Snapshot(_))));
        assert!(matches!(fast.recv().await, Some(LiveMessage::Update(_))));

        assert_eq!(broadcaster.broadcast(&entry("b", 1)), 1);
        assert_eq!(fast.recv().await.unwrap(), LiveMessage::Update(entry("b", 1)));

        assert!(matches!(slow.recv().await, Some(LiveMessage::Snapshot(_))));
        assert_eq!(slow.recv().await.unwrap(), LiveMessage::Update(entry("a", 0)));
        assert_eq!(broadcaster.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_failure_unregisters() {
        let store = Arc::new(MemoryHistoryStore::new());
        store.set_offline(true);
        let broadcaster = broadcaster_with(store, LiveConfig::default());

        assert!(matches!(broadcaster.connect().await, Err(LiveError::Snapshot(_))));
        assert_eq!(broadcaster.connection_count(), 0);
    }
}
