//! API module for HTTP and WebSocket endpoints
//!
//! This module provides the read API and the live update channel for history viewers.

pub mod http;
pub mod rest;
pub mod websocket;

pub use http::create_router;
