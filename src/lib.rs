//! History Relay
//!
//! Consumes classification-result events from a publish/subscribe bus,
//! persists each result exactly once and pushes live updates to connected
//! viewers.
//!
//! # Features
//!
//! - **Idempotent Storage**: `INSERT .. ON CONFLICT DO NOTHING` keyed by event id
//! - **Live Updates**: WebSocket snapshot on connect, then one update per new entry
//! - **Resilient Consumer**: malformed events are dropped, bus drops are retried forever
//! - **Read API**: `GET /history?limit=N`, newest first
//!
//! # Modules
//!
//! - `types`: The `HistoryEntry` record and read limits
//! - `store`: Store contract with PostgreSQL and in-memory backends
//! - `bus`: Bus contract with Redis pub/sub and in-memory backends
//! - `consumer`: Event parsing and the subscribe/reconnect loop
//! - `query`: Read service for polling clients
//! - `api`: HTTP routes, WebSocket handler and the live broadcaster
//! - `config`: CLI and environment configuration
//! - `server`: Process wiring and graceful shutdown
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use history_relay::bus::MemoryBus;
//! use history_relay::config::{ConsumerConfig, LiveConfig};
//! use history_relay::server::Relay;
//! use history_relay::store::MemoryHistoryStore;
//!
//! # async fn demo() {
//! let base = url::Url::parse("https://docs.example.com/files/").unwrap();
//! let relay = Relay::new(
//!     Arc::new(MemoryHistoryStore::new()),
//!     Arc::new(MemoryBus::default()),
//!     ConsumerConfig::new(base),
//!     &LiveConfig::default(),
//! );
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//! tokio::spawn(relay.consumer.run(shutdown));
//! # }
//! ```

pub mod api;
pub mod bus;
pub mod config;
pub mod consumer;
pub mod query;
pub mod server;
pub mod store;
pub mod types;

// Re-export commonly used items at crate root
pub use api::websocket::{LiveBroadcaster, LiveMessage};
pub use consumer::{ConsumerState, EventConsumer, Outcome};
pub use query::QueryService;
pub use store::HistoryStore;
pub use types::HistoryEntry;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
