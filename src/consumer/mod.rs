//! Bus consumer
//!
//! Subscribes to the classification topic, turns each payload into a
//! [`HistoryEntry`], persists it and pushes it to live connections.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──► Subscribing ──► Consuming
//!                      ▲               │ stream error / end
//!                      │               ▼
//!                      └────────── Reconnecting (fixed delay)
//! ```
//!
//! Retries are unbounded with a fixed delay. The loop only stops on shutdown.

mod event;

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::watch;

use crate::api::websocket::LiveBroadcaster;
use crate::bus::EventBus;
use crate::config::ConsumerConfig;
use crate::store::{HistoryStore, StoreError};
use crate::types::HistoryEntry;

pub use event::{parse_event, source_ref};

/// Lifecycle of the subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Subscribing,
    Consuming,
    Reconnecting,
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumerState::Disconnected => write!(f, "disconnected"),
            ConsumerState::Subscribing => write!(f, "subscribing"),
            ConsumerState::Consuming => write!(f, "consuming"),
            ConsumerState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Why a single message was not stored
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("event id is empty")]
    EmptyId,
    #[error("event id {0:?} cannot be used as a path segment")]
    InvalidId(String),
    #[error("event timestamp is out of range")]
    InvalidTimestamp,
    #[error("cannot build source reference for {id}: {source}")]
    SourceRef {
        id: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to persist entry {id}: {source}")]
    Store {
        id: String,
        #[source]
        source: StoreError,
    },
}

impl ConsumerError {
    /// Bad input that will never succeed; dropped rather than retried
    pub fn is_malformed(&self) -> bool {
        !matches!(self, ConsumerError::Store { .. })
    }
}

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// First sighting of this id; pushed to `delivered` live connections
    Stored { id: String, delivered: usize },
    /// Redelivery of an id that is already stored; nothing is pushed
    Duplicate { id: String },
}

/// Drives store and broadcaster from the bus
#[derive(Debug)]
pub struct EventConsumer {
    bus: Arc<dyn EventBus>,
    store: Arc<dyn HistoryStore>,
    broadcaster: LiveBroadcaster,
    config: ConsumerConfig,
    state: watch::Sender<ConsumerState>,
}

impl EventConsumer {
    pub fn new(
        bus: Arc<dyn EventBus>,
        store: Arc<dyn HistoryStore>,
        broadcaster: LiveBroadcaster,
        config: ConsumerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Disconnected);
        Self {
            bus,
            store,
            broadcaster,
            config,
            state,
        }
    }

    /// Observe state transitions
    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ConsumerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "consumer state changed");
        }
    }

    /// Parse, persist and broadcast one payload.
    ///
    /// Broadcast only happens after a successful insert of a new id; a store
    /// failure skips it so live viewers never see an entry that is not durable.
    pub async fn handle_message(&self, payload: &[u8]) -> Result<Outcome, ConsumerError> {
        let entry = parse_event(payload, &self.config.source_base, Utc::now())?;
        self.persist_and_broadcast(entry).await
    }

    async fn persist_and_broadcast(&self, entry: HistoryEntry) -> Result<Outcome, ConsumerError> {
        let inserted = self
            .store
            .insert(&entry)
            .await
            .map_err(|source| ConsumerError::Store {
                id: entry.id.clone(),
                source,
            })?;

        if !inserted {
            return Ok(Outcome::Duplicate { id: entry.id });
        }

        let delivered = self.broadcaster.broadcast(&entry);
        Ok(Outcome::Stored {
            id: entry.id,
            delivered,
        })
    }

    async fn process(&self, payload: &[u8]) {
        match self.handle_message(payload).await {
            Ok(Outcome::Stored { id, delivered }) => {
                tracing::info!(id = %id, delivered, "stored history entry");
            }
            Ok(Outcome::Duplicate { id }) => {
                tracing::debug!(id = %id, "ignoring redelivered event");
            }
            Err(err) if err.is_malformed() => {
                tracing::warn!(error = %err, bytes = payload.len(), "dropping unparseable event");
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to store event, live broadcast skipped");
            }
        }
    }

    /// Consume until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let topic = self.config.topic.clone();
        let delay = self.config.reconnect_delay;

        while !*shutdown.borrow() {
            self.set_state(ConsumerState::Subscribing);

            let subscription = tokio::select! {
                subscription = self.bus.subscribe(&topic) => subscription,
                _ = shutdown.changed() => break,
            };

            match subscription {
                Ok(mut messages) => {
                    self.set_state(ConsumerState::Consuming);
                    tracing::info!(topic = %topic, "subscribed to event bus");

                    loop {
                        let next = tokio::select! {
                            next = messages.next() => next,
                            _ = shutdown.changed() => {
                                self.set_state(ConsumerState::Disconnected);
                                return;
                            }
                        };

                        match next {
                            Some(Ok(payload)) => self.process(&payload).await,
                            Some(Err(err)) => {
                                tracing::warn!(
                                    topic = %topic,
                                    error = %err,
                                    "event bus subscription failed"
                                );
                                break;
                            }
                            None => {
                                tracing::warn!(topic = %topic, "event bus subscription closed");
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::error!(
                        topic = %topic,
                        error = %err,
                        "failed to subscribe to event bus"
                    );
                }
            }

            self.set_state(ConsumerState::Reconnecting);
            tracing::info!(delay_secs = delay.as_secs_f64(), "reconnecting to event bus");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.set_state(ConsumerState::Disconnected);
        tracing::info!("event consumer stopped");
    }
}
