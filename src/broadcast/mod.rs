//! Broadcast bridge
//!
//! Re-publishes price updates to a single downstream WebSocket listener.

mod listener;
mod message;

pub use listener::{ListenerError, ListenerServer, ListenerSlot};
pub use message::{BroadcastMessage, WELCOME};

use async_trait::async_trait;
use thiserror::Error;

/// Forwarding errors; never fatal to the update loop
#[derive(Debug, Error)]
pub enum SinkDeliveryError {
    /// The receiving end went away
    #[error("Listener disconnected")]
    Closed,
    /// The receiving end is not keeping up
    #[error("Listener buffer full")]
    Backpressure,
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for forwarded messages
#[async_trait]
pub trait BroadcastSink: Send + Sync {
    async fn send(&self, message: &BroadcastMessage) -> Result<(), SinkDeliveryError>;
}
