//! Publish/subscribe bus the relay consumes from
//!
//! A subscription is a stream of raw payloads. The stream yielding an error
//! or ending means the transport dropped; the consumer resubscribes.

mod memory;
mod redis;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use self::memory::MemoryBus;
pub use self::redis::RedisBus;

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Live stream of payloads for one topic
pub type Subscription = BoxStream<'static, BusResult<Vec<u8>>>;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("bus unavailable: {0}")]
    Unavailable(String),
    #[error("subscriber fell behind, {0} messages skipped")]
    Lagged(u64),
}

/// Source of inbound events
#[async_trait]
pub trait EventBus: Send + Sync + std::fmt::Debug {
    /// Open a subscription on `topic`.
    async fn subscribe(&self, topic: &str) -> BusResult<Subscription>;
}
