//! In-process bus
//!
//! Pub/sub semantics match Redis: a message published while nobody is
//! subscribed is lost. `disconnect_all` ends every open subscription, which
//! is how the test suite simulates a transport crash.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use super::{BusError, BusResult, EventBus, Subscription};

/// Bus that delivers payloads between tasks of the same process
#[derive(Debug)]
pub struct MemoryBus {
    topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    generation: watch::Sender<u64>,
    offline: AtomicBool,
    capacity: usize,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl MemoryBus {
    /// Create a bus buffering up to `capacity` messages per topic
    pub fn new(capacity: usize) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            topics: Mutex::new(HashMap::new()),
            generation,
            offline: AtomicBool::new(false),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish a payload; returns how many subscriptions received it
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> usize {
        self.sender(topic).send(payload.into()).unwrap_or(0)
    }

    /// Number of open subscriptions on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// End every open subscription as if the connection dropped
    pub fn disconnect_all(&self) {
        self.generation.send_modify(|g| *g += 1);
    }

    /// Refuse new subscriptions until reset
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn subscribe(&self, topic: &str) -> BusResult<Subscription> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("memory bus is offline".to_string()));
        }

        let mut rx = self.sender(topic).subscribe();
        let mut generation = self.generation.subscribe();

        let stream = async_stream::stream! {
            loop {
                let received = tokio::select! {
                    received = rx.recv() => received,
                    _ = generation.changed() => break,
                };

                match received {
                    Ok(payload) => yield Ok(payload),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        yield Err(BusError::Lagged(skipped));
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(stream.boxed())
    }
}
