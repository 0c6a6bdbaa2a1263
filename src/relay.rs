//! End-to-end relay: bootstrap, subscribe, stream, tear down
//!
//! Shared by the print-only `dump` command and the listener-backed `serve`
//! command; they differ only in the sink handed to the update loop.

use crate::bootstrap::{self, BootstrapError, ResolvedKeys, SubscriptionPlan};
use crate::broadcast::BroadcastSink;
use crate::config::{AccountSelection, SubscriptionModeRequest};
use crate::oracle::{AccountSource, KeyResolver, ResolutionError};
use crate::stream::{LoopStats, StreamError, UpdateLoop, UpdateLoopConfig};
use crate::watch::{SubscriptionMode, WatchError, WatchSession};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Relay settings
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Network name used for key resolution
    pub network: String,
    pub mode: SubscriptionModeRequest,
    pub selection: AccountSelection,
    pub max_products: Option<usize>,
    pub update_loop: UpdateLoopConfig,
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub mode: SubscriptionMode,
    pub subscriptions: usize,
    pub products: usize,
    pub prices: usize,
    pub stats: LoopStats,
}

/// How a run ended without error
#[derive(Debug)]
pub enum RelayOutcome {
    /// No mapping key is known for the network; nothing was started
    MissingMappingKey(ResolutionError),
    /// Streamed until shutdown
    Finished(RelayReport),
}

pub struct Relay {
    settings: RelaySettings,
    shutdown: CancellationToken,
    sink: Option<Arc<dyn BroadcastSink>>,
}

impl Relay {
    pub fn new(settings: RelaySettings, shutdown: CancellationToken) -> Self {
        Self {
            settings,
            shutdown,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn BroadcastSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run the relay until shutdown
    ///
    /// `open_source` builds the account source once the keys are known.
    /// Subscriptions are released and the session disconnected on every
    /// path after a successful connect, including errors.
    pub async fn run<A, F, S>(
        &self,
        resolver: &dyn KeyResolver,
        open_source: F,
        session: &mut S,
    ) -> Result<RelayOutcome, RelayError>
    where
        A: AccountSource,
        F: FnOnce(&ResolvedKeys) -> A,
        S: WatchSession + ?Sized,
    {
        let keys = match bootstrap::resolve_keys(resolver, &self.settings.network, self.settings.mode) {
            Ok(keys) => keys,
            Err(BootstrapError::Resolution(e)) => {
                tracing::error!(error = %e, "Cannot start without a mapping key");
                return Ok(RelayOutcome::MissingMappingKey(e));
            }
            Err(e) => return Err(e.into()),
        };

        let source = open_source(&keys);
        let mut catalog = bootstrap::load_catalog(&source, self.settings.max_products).await?;
        let plan =
            SubscriptionPlan::build(&source, &catalog, keys.program, self.settings.selection).await?;

        if let Err(e) = session.connect().await {
            let _ = session.disconnect().await;
            return Err(e.into());
        }

        let mut update_loop = UpdateLoop::new(self.settings.update_loop.clone(), self.shutdown.clone());
        if let Some(sink) = &self.sink {
            update_loop = update_loop.with_sink(sink.clone());
        }

        let streamed = match plan.apply(session).await {
            Ok(()) => update_loop
                .run(session, &mut catalog)
                .await
                .map_err(RelayError::from),
            Err(e) => Err(e.into()),
        };

        // Teardown runs regardless of how streaming ended
        if let Err(e) = plan.release(session).await {
            tracing::warn!(error = %e, "Failed to release subscriptions");
        }
        if let Err(e) = session.disconnect().await {
            tracing::warn!(error = %e, "Failed to disconnect watch session");
        }

        let stats = streamed?;
        Ok(RelayOutcome::Finished(RelayReport {
            mode: plan.mode(),
            subscriptions: plan.len(),
            products: catalog.product_count(),
            prices: catalog.price_count(),
            stats,
        }))
    }
}
