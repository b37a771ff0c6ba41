//! WebSocket module for live history updates
//!
//! Provides the WebSocket endpoint at `/ws`.
//!
//! ## Protocol
//! - On connect the server sends one `snapshot` with the most recent entries
//! - Every newly persisted entry follows as an `update`
//! - Delivery is best-effort; a client that falls behind or disconnects
//!   reconnects to get a fresh snapshot
//! - The server pings periodically and answers `{"type":"ping"}` with a pong

pub mod broadcaster;
pub mod events;
pub mod handler;
pub mod state;

// Re-export commonly used items
pub use broadcaster::{ConnectionId, LiveBroadcaster, LiveConnection, LiveError};
pub use events::LiveMessage;
pub use state::AppState;
