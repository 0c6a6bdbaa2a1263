//! Subscription bookkeeping and session state machine

use super::{SessionState, WatchError};
use crate::oracle::AccountKey;
use std::collections::BTreeSet;
use std::fmt;

/// Subscription mode of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    /// Individually named price accounts
    Accounts,
    /// Every account owned by one program
    Program,
}

impl fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionMode::Accounts => write!(f, "per-account"),
            SubscriptionMode::Program => write!(f, "program"),
        }
    }
}

/// Tracks state, mode and the subscribed/tracked key sets of one session
///
/// The mode is fixed by the first subscription and stays fixed for the
/// session lifetime, even after every subscription is removed.
#[derive(Debug)]
pub struct SubscriptionTable {
    state: SessionState,
    mode: Option<SubscriptionMode>,
    accounts: BTreeSet<AccountKey>,
    program: Option<AccountKey>,
    tracked: BTreeSet<AccountKey>,
}

impl Default for SubscriptionTable {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            mode: None,
            accounts: BTreeSet::new(),
            program: None,
            tracked: BTreeSet::new(),
        }
    }
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> Option<SubscriptionMode> {
        self.mode
    }

    /// Disconnected → Connected
    pub fn connected(&mut self) -> Result<(), WatchError> {
        match self.state {
            SessionState::Disconnected => {
                self.state = SessionState::Connected;
                Ok(())
            }
            state => Err(WatchError::InvalidState {
                operation: "connect",
                state,
            }),
        }
    }

    /// Any state → Closed; drops every subscription
    pub fn closed(&mut self) {
        self.state = SessionState::Closed;
        self.accounts.clear();
        self.program = None;
        self.tracked.clear();
    }

    /// Updates can only be awaited once something is subscribed
    pub fn require_streaming(&self) -> Result<(), WatchError> {
        match self.state {
            SessionState::Subscribed => Ok(()),
            state => Err(WatchError::InvalidState {
                operation: "wait for updates",
                state,
            }),
        }
    }

    /// Register a per-account subscription; `true` if newly added
    pub fn add_account(&mut self, key: AccountKey) -> Result<bool, WatchError> {
        self.require_live("subscribe")?;
        self.claim_mode(SubscriptionMode::Accounts)?;
        self.state = SessionState::Subscribed;
        Ok(self.accounts.insert(key))
    }

    /// Drop a per-account subscription; `true` if it existed
    pub fn remove_account(&mut self, key: &AccountKey) -> Result<bool, WatchError> {
        self.require_live("unsubscribe")?;
        Ok(self.accounts.remove(key))
    }

    /// Register the program subscription; `true` if newly added
    pub fn set_program(
        &mut self,
        program: AccountKey,
        known: BTreeSet<AccountKey>,
    ) -> Result<bool, WatchError> {
        self.require_live("subscribe to a program")?;
        self.claim_mode(SubscriptionMode::Program)?;
        match self.program {
            Some(current) if current == program => Ok(false),
            Some(_) => Err(WatchError::InvalidState {
                operation: "subscribe to a second program",
                state: self.state,
            }),
            None => {
                self.program = Some(program);
                self.tracked = known;
                self.state = SessionState::Subscribed;
                Ok(true)
            }
        }
    }

    /// Drop the program subscription; `true` if it existed
    pub fn clear_program(&mut self, program: &AccountKey) -> Result<bool, WatchError> {
        self.require_live("unsubscribe from a program")?;
        if self.program.as_ref() != Some(program) {
            return Ok(false);
        }
        self.program = None;
        self.tracked.clear();
        Ok(true)
    }

    /// Mark an account as known under the program; `true` if first seen
    pub fn track(&mut self, key: AccountKey) -> bool {
        self.tracked.insert(key)
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn has_account(&self, key: &AccountKey) -> bool {
        self.accounts.contains(key)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &AccountKey> {
        self.accounts.iter()
    }

    pub fn program(&self) -> Option<AccountKey> {
        self.program
    }

    fn require_live(&self, operation: &'static str) -> Result<(), WatchError> {
        match self.state {
            SessionState::Connected | SessionState::Subscribed => Ok(()),
            state => Err(WatchError::InvalidState { operation, state }),
        }
    }

    fn claim_mode(&mut self, requested: SubscriptionMode) -> Result<(), WatchError> {
        match self.mode {
            Some(active) if active != requested => {
                Err(WatchError::ModeConflict { requested, active })
            }
            _ => {
                self.mode = Some(requested);
                Ok(())
            }
        }
    }
}
