//! Persistent store for history entries
//!
//! The store is an append-only log keyed by the producer-assigned entry id:
//! - `HistoryStore`: the contract shared by every backend
//! - `PostgresHistoryStore`: durable backend on a pooled sqlx connection
//! - `MemoryHistoryStore`: in-process backend for tests and database-less runs
//!
//! # Write Path
//!
//! ```text
//! ┌──────────┐    ┌──────────────────────────┐    ┌──────────────┐
//! │ consumer │───►│ INSERT .. ON CONFLICT    │───►│ true: new    │
//! │ insert() │    │ (id) DO NOTHING          │    │ false: dupe  │
//! └──────────┘    └──────────────────────────┘    └──────────────┘
//! ```

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::types::HistoryEntry;

pub use memory::MemoryHistoryStore;
pub use postgres::PostgresHistoryStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable, idempotent log of history entries.
///
/// Implementations must guarantee at most one logical row per `id`, even
/// when `insert` races with itself.
#[async_trait]
pub trait HistoryStore: Send + Sync + std::fmt::Debug {
    /// Ensure the backing schema exists. Safe to call on every start.
    async fn init(&self) -> StoreResult<()>;

    /// Insert an entry unless one with the same id already exists.
    ///
    /// Returns `true` when a row was created and `false` for a duplicate.
    /// A duplicate never updates the stored row.
    async fn insert(&self, entry: &HistoryEntry) -> StoreResult<bool>;

    /// Most recent entries, newest first.
    ///
    /// A non-positive `limit` falls back to [`crate::types::DEFAULT_LIMIT`].
    async fn latest(&self, limit: i64) -> StoreResult<Vec<HistoryEntry>>;

    /// Number of stored entries
    async fn count(&self) -> StoreResult<u64>;
}
