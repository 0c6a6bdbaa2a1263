//! Update loop
//!
//! Drains a watch session, keeps the catalog current, and forwards each
//! price to an optional broadcast sink until shutdown.

mod event;
mod update_loop;

pub use event::PriceEvent;
pub use update_loop::{UpdateLoop, UpdateLoopConfig, DEFAULT_POLL_INTERVAL};

use crate::oracle::AccountKey;
use crate::watch::WatchError;
use thiserror::Error;

/// Counters of one loop run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Price updates applied to the catalog
    pub routed: u64,
    /// Messages accepted by the sink
    pub forwarded: u64,
    pub forward_failures: u64,
    /// Accounts discovered under a program subscription
    pub discovered: u64,
    /// Updates rejected as older than the stored state
    pub stale: u64,
}

/// Fatal loop errors
#[derive(Debug, Error)]
pub enum StreamError {
    /// The session produced an update it could not interpret
    #[error("Protocol violation for {}: {reason}", describe_key(.key))]
    ProtocolViolation {
        key: Option<AccountKey>,
        reason: String,
    },
    #[error(transparent)]
    Watch(#[from] WatchError),
}

fn describe_key(key: &Option<AccountKey>) -> String {
    key.map(|k| k.to_string())
        .unwrap_or_else(|| "unknown account".to_string())
}
