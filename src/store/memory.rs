//! In-process backend for the history store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{HistoryStore, StoreError, StoreResult};
use crate::types::{newest_first, normalize_limit, HistoryEntry};

/// Store that keeps entries in memory.
///
/// Used by the test suite and when the relay runs without `DATABASE_URL`.
/// Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    entries: RwLock<HashMap<String, HistoryEntry>>,
    offline: AtomicBool,
}

impl MemoryHistoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`StoreError::Unavailable`] until reset.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn init(&self) -> StoreResult<()> {
        self.check_online()
    }

    async fn insert(&self, entry: &HistoryEntry) -> StoreResult<bool> {
        self.check_online()?;
        let mut entries = self.entries.write();
        if entries.contains_key(&entry.id) {
            return Ok(false);
        }
        entries.insert(entry.id.clone(), entry.clone());
        Ok(true)
    }

    async fn latest(&self, limit: i64) -> StoreResult<Vec<HistoryEntry>> {
        self.check_online()?;
        let mut all: Vec<HistoryEntry> = self.entries.read().values().cloned().collect();
        all.sort_by(newest_first);
        all.truncate(normalize_limit(limit) as usize);
        Ok(all)
    }

    async fn count(&self) -> StoreResult<u64> {
        self.check_online()?;
        Ok(self.entries.read().len() as u64)
    }
}
