//! Oracle account access
//!
//! Key resolution, account layouts, the product/price catalog, and the
//! account source used to bootstrap a watch session.

mod catalog;
mod key;
pub mod layout;
mod resolver;
mod rpc;
mod types;

pub use catalog::{ApplyOutcome, Catalog};
pub use key::{AccountKey, KeyParseError, KEY_LEN};
pub use resolver::ConfigKeyResolver;
pub use rpc::{RpcAccountSource, DEFAULT_COMMITMENT};
pub use types::{PriceAccount, PriceStatus, PriceType, Product};

use crate::jsonrpc::{DataError, RpcErrorObject};
use async_trait::async_trait;
use layout::LayoutError;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Role of a well-known account on a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// First mapping account of the product directory
    Mapping,
    /// Oracle program owning every product and price account
    Program,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::Mapping => write!(f, "mapping"),
            KeyRole::Program => write!(f, "program"),
        }
    }
}

/// Key resolution errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No {role} key known for network {network}")]
    NotFound { network: String, role: KeyRole },
}

/// Account source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error: {0}")]
    Rpc(RpcErrorObject),
    #[error("Account {0} not found")]
    MissingAccount(AccountKey),
    #[error("Account {key} has an unexpected layout: {source}")]
    Layout { key: AccountKey, source: LayoutError },
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    InvalidKey(#[from] KeyParseError),
}

/// Maps a network name and role to an account key
#[cfg_attr(test, automock)]
pub trait KeyResolver: Send + Sync {
    fn resolve(&self, network: &str, role: KeyRole) -> Result<AccountKey, ResolutionError>;
}

/// Read access to product and price accounts
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// Reload every product and price from the ledger
    async fn refresh_all(&self) -> Result<(), SourceError>;

    /// Products known after the last refresh, in directory order
    async fn list_products(&self) -> Result<Vec<Product>, SourceError>;

    /// Price accounts of one product, in chain order
    async fn list_prices(&self, product: &Product) -> Result<Vec<PriceAccount>, SourceError>;

    /// Every account owned by the oracle program
    async fn list_all_accounts(&self) -> Result<BTreeSet<AccountKey>, SourceError>;
}
