//! WebSocket client library
//!
//! Provides a reusable bidirectional WebSocket client with automatic
//! reconnection, ping handling, and configurable backoff.

mod client;
mod types;

pub use client::WsClient;
pub use types::{WsConfig, WsError, WsMessage};
