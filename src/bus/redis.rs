//! Redis pub/sub backend.

use async_trait::async_trait;
use futures::StreamExt;

use super::{BusResult, EventBus, Subscription};

/// Bus backed by Redis `SUBSCRIBE`.
///
/// Each subscription owns a dedicated connection; when Redis drops it the
/// message stream ends.
#[derive(Debug, Clone)]
pub struct RedisBus {
    client: redis::Client,
}

impl RedisBus {
    /// Validate the connection string. No connection is opened yet.
    pub fn open(url: &str) -> BusResult<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }
}

#[async_trait]
impl EventBus for RedisBus {
    async fn subscribe(&self, topic: &str) -> BusResult<Subscription> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;
        tracing::debug!(topic, "redis subscription established");

        let messages = pubsub
            .into_on_message()
            .map(|msg| Ok(msg.get_payload_bytes().to_vec()));

        Ok(messages.boxed())
    }
}
