//! Subscription bootstrap
//!
//! Resolves the well-known keys, collects the product catalog and decides
//! which subscriptions a watch session needs.

use crate::config::{AccountSelection, SubscriptionModeRequest};
use crate::oracle::{
    AccountKey, AccountSource, Catalog, KeyResolver, KeyRole, ResolutionError, SourceError,
};
use crate::telemetry::{set_gauge, GaugeMetric};
use crate::watch::{SubscriptionMode, WatchError, WatchSession};
use std::collections::BTreeSet;
use thiserror::Error;

/// Bootstrap errors
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("Failed to read oracle accounts: {0}")]
    Source(#[from] SourceError),
    #[error("No price accounts found to subscribe to")]
    EmptyCatalog,
}

/// Keys needed to start streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedKeys {
    pub mapping: AccountKey,
    /// Set only when program mode was requested and the key is known
    pub program: Option<AccountKey>,
}

/// Resolve the mapping key, and the program key when program mode is
/// requested
///
/// A missing mapping key is an error. A missing program key downgrades to
/// per-account mode.
pub fn resolve_keys(
    resolver: &dyn KeyResolver,
    network: &str,
    mode: SubscriptionModeRequest,
) -> Result<ResolvedKeys, BootstrapError> {
    let mapping = resolver.resolve(network, KeyRole::Mapping)?;

    let program = match mode {
        SubscriptionModeRequest::Accounts => None,
        SubscriptionModeRequest::Program => match resolver.resolve(network, KeyRole::Program) {
            Ok(program) => Some(program),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Program key unavailable, falling back to per-account subscriptions"
                );
                None
            }
        },
    };

    tracing::info!(%network, %mapping, program = ?program.map(|k| k.to_string()), "Resolved oracle keys");
    Ok(ResolvedKeys { mapping, program })
}

/// Refresh the source and collect every price of the first `max_products`
/// products
pub async fn load_catalog<A>(source: &A, max_products: Option<usize>) -> Result<Catalog, BootstrapError>
where
    A: AccountSource + ?Sized,
{
    source.refresh_all().await?;
    let products = source.list_products().await?;
    let available = products.len();

    let mut catalog = Catalog::new();
    for product in products.into_iter().take(max_products.unwrap_or(usize::MAX)) {
        tracing::info!(product = %product.key, attrs = ?product.attrs, "Product");
        let prices = source.list_prices(&product).await?;
        catalog.insert_product(product);
        for price in prices {
            catalog.insert_price(price);
        }
    }

    if catalog.is_empty() {
        tracing::warn!(available, "No price accounts loaded");
    }
    set_gauge(GaugeMetric::CatalogPrices, catalog.price_count() as f64);
    tracing::info!(
        products = catalog.product_count(),
        available,
        prices = catalog.price_count(),
        "Catalog loaded"
    );
    Ok(catalog)
}

/// Subscriptions to request from a watch session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionPlan {
    /// One subscription per price account
    Accounts(Vec<AccountKey>),
    /// One subscription covering every account of `program`
    Program {
        program: AccountKey,
        known: BTreeSet<AccountKey>,
    },
}

impl SubscriptionPlan {
    /// Decide the subscriptions for a loaded catalog
    pub async fn build<A>(
        source: &A,
        catalog: &Catalog,
        program: Option<AccountKey>,
        selection: AccountSelection,
    ) -> Result<Self, BootstrapError>
    where
        A: AccountSource + ?Sized,
    {
        if let Some(program) = program {
            let known = source.list_all_accounts().await?;
            return Ok(SubscriptionPlan::Program { program, known });
        }

        let keys: Vec<AccountKey> = match selection {
            AccountSelection::All => catalog.price_keys().to_vec(),
            AccountSelection::First => catalog.price_keys().iter().take(1).copied().collect(),
        };
        if keys.is_empty() {
            return Err(BootstrapError::EmptyCatalog);
        }
        Ok(SubscriptionPlan::Accounts(keys))
    }

    pub fn mode(&self) -> SubscriptionMode {
        match self {
            SubscriptionPlan::Accounts(_) => SubscriptionMode::Accounts,
            SubscriptionPlan::Program { .. } => SubscriptionMode::Program,
        }
    }

    /// Number of subscribe calls the plan makes
    pub fn len(&self) -> usize {
        match self {
            SubscriptionPlan::Accounts(keys) => keys.len(),
            SubscriptionPlan::Program { .. } => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Issue every subscription on a connected session
    pub async fn apply<S>(&self, session: &mut S) -> Result<(), WatchError>
    where
        S: WatchSession + ?Sized,
    {
        match self {
            SubscriptionPlan::Accounts(keys) => {
                for key in keys {
                    session.subscribe(*key).await?;
                }
            }
            SubscriptionPlan::Program { program, known } => {
                session.program_subscribe(*program, known.clone()).await?;
            }
        }
        set_gauge(GaugeMetric::Subscriptions, self.len() as f64);
        tracing::info!(mode = %self.mode(), count = self.len(), "Subscriptions requested");
        Ok(())
    }

    /// Undo [`apply`](Self::apply)
    pub async fn release<S>(&self, session: &mut S) -> Result<(), WatchError>
    where
        S: WatchSession + ?Sized,
    {
        match self {
            SubscriptionPlan::Accounts(keys) => {
                for key in keys {
                    session.unsubscribe(*key).await?;
                }
            }
            SubscriptionPlan::Program { program, .. } => {
                session.program_unsubscribe(*program).await?;
            }
        }
        set_gauge(GaugeMetric::Subscriptions, 0.0);
        Ok(())
    }
}
