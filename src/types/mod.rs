//! Data types for the history relay
//!
//! This module contains the record shared by the store, the consumer and the API.

mod entry;

pub use entry::{newest_first, HistoryEntry};

/// Default number of entries returned by reads and live snapshots
pub const DEFAULT_LIMIT: i64 = 50;

/// Hard upper bound for a single read
pub const MAX_LIMIT: i64 = 1000;

/// Normalize a requested read size: non-positive means default, capped at [`MAX_LIMIT`]
pub fn normalize_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_LIMIT
    } else {
        limit.min(MAX_LIMIT)
    }
}
