//! Watch session
//!
//! A live streaming connection to the ledger that delivers account updates
//! for either individually subscribed price accounts or a whole program.

mod rpc;
mod subscriptions;

pub use rpc::RpcWatchSession;
pub use subscriptions::{SubscriptionMode, SubscriptionTable};

use crate::oracle::{AccountKey, PriceAccount};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// A decoded update from the watch session
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Fresh state of a price account
    Price(PriceAccount),
    /// Accounts seen for the first time under a program subscription
    Discovery(BTreeSet<AccountKey>),
    /// Notification that could not be interpreted
    Unknown {
        key: Option<AccountKey>,
        reason: String,
    },
}

/// Lifecycle state of a watch session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Subscribed,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connected => "connected",
            SessionState::Subscribed => "subscribed",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Watch session errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// Transport unreachable or lost
    #[error("Connection error: {0}")]
    Connection(String),
    /// Operation not allowed in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    /// Per-account and program subscriptions mixed in one session
    #[error("Cannot use {requested} subscriptions: session is in {active} mode")]
    ModeConflict {
        requested: SubscriptionMode,
        active: SubscriptionMode,
    },
    /// Frame of unexpected shape from the remote node
    #[error("Protocol violation: {0}")]
    Protocol(String),
}

/// Live subscription session
///
/// Implementations run on a single task; no two calls overlap. Subscription
/// calls are fire-and-forget: confirmations are consumed by
/// [`next_update`](WatchSession::next_update).
#[async_trait]
pub trait WatchSession: Send {
    /// Current lifecycle state
    fn state(&self) -> SessionState;

    /// Establish the transport
    async fn connect(&mut self) -> Result<(), WatchError>;

    /// Subscribe to one account; rejected once program mode is active
    async fn subscribe(&mut self, account: AccountKey) -> Result<(), WatchError>;

    async fn unsubscribe(&mut self, account: AccountKey) -> Result<(), WatchError>;

    /// Subscribe to every account owned by `program`, seeding the tracked
    /// set with `known`; rejected once per-account mode is active
    async fn program_subscribe(
        &mut self,
        program: AccountKey,
        known: BTreeSet<AccountKey>,
    ) -> Result<(), WatchError>;

    async fn program_unsubscribe(&mut self, program: AccountKey) -> Result<(), WatchError>;

    /// Wait for the next update, in the order received
    ///
    /// Cancel safe: if the returned future is dropped before completion, no
    /// update has been consumed.
    async fn next_update(&mut self) -> Result<Update, WatchError>;

    /// Release the transport; idempotent
    async fn disconnect(&mut self) -> Result<(), WatchError>;
}
