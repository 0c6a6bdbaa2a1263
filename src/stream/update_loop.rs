//! Cancellable update loop

use super::{LoopStats, PriceEvent, StreamError};
use crate::broadcast::{BroadcastMessage, BroadcastSink};
use crate::oracle::{ApplyOutcome, Catalog, PriceAccount};
use crate::telemetry::{increment, increment_by, CounterMetric};
use crate::watch::{Update, WatchSession};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default slice between shutdown checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Update loop configuration
#[derive(Debug, Clone)]
pub struct UpdateLoopConfig {
    /// Upper bound on shutdown latency while an update is pending
    pub poll_interval: Duration,
}

impl Default for UpdateLoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Drains a watch session until shutdown
///
/// Runs on a single task: one `next_update` call is in flight at a time,
/// and updates are routed in the order the session returns them.
pub struct UpdateLoop {
    config: UpdateLoopConfig,
    shutdown: CancellationToken,
    sink: Option<Arc<dyn BroadcastSink>>,
}

impl UpdateLoop {
    pub fn new(config: UpdateLoopConfig, shutdown: CancellationToken) -> Self {
        Self {
            config,
            shutdown,
            sink: None,
        }
    }

    /// Forward every price update to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn BroadcastSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Run until shutdown or a fatal error
    ///
    /// Returns `Ok` on shutdown. An [`Update::Unknown`] or a session error
    /// ends the loop with an error; sink failures never do.
    pub async fn run<S>(
        &self,
        session: &mut S,
        catalog: &mut Catalog,
    ) -> Result<LoopStats, StreamError>
    where
        S: WatchSession + ?Sized,
    {
        let mut stats = LoopStats::default();
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            forwarding = self.has_sink(),
            "Update loop started"
        );

        while let Some(update) = self.next(session).await? {
            self.route(update, catalog, &mut stats).await?;
        }

        tracing::info!(
            routed = stats.routed,
            forwarded = stats.forwarded,
            forward_failures = stats.forward_failures,
            discovered = stats.discovered,
            stale = stats.stale,
            "Update loop stopped"
        );
        Ok(stats)
    }

    /// Next update, or `None` once shutdown is requested
    ///
    /// The pending call is dropped on shutdown, which cancels it.
    async fn next<S>(&self, session: &mut S) -> Result<Option<Update>, StreamError>
    where
        S: WatchSession + ?Sized,
    {
        if self.shutdown.is_cancelled() {
            return Ok(None);
        }

        let mut pending = session.next_update();
        loop {
            match tokio::time::timeout(self.config.poll_interval, &mut pending).await {
                Ok(update) => return Ok(Some(update?)),
                Err(_) if self.shutdown.is_cancelled() => {
                    tracing::debug!("Shutdown requested, cancelling pending update");
                    return Ok(None);
                }
                Err(_) => {}
            }
        }
    }

    async fn route(
        &self,
        update: Update,
        catalog: &mut Catalog,
        stats: &mut LoopStats,
    ) -> Result<(), StreamError> {
        match update {
            Update::Price(account) => self.route_price(account, catalog, stats).await,
            Update::Discovery(keys) => {
                stats.discovered += keys.len() as u64;
                increment_by(CounterMetric::Discoveries, keys.len() as u64);
                for key in &keys {
                    tracing::info!(account = %key, "Discovered account");
                }
            }
            Update::Unknown { key, reason } => {
                tracing::error!(
                    account = ?key.map(|k| k.to_string()),
                    %reason,
                    "Unrecognized update"
                );
                return Err(StreamError::ProtocolViolation { key, reason });
            }
        }
        Ok(())
    }

    async fn route_price(&self, account: PriceAccount, catalog: &mut Catalog, stats: &mut LoopStats) {
        let event = PriceEvent::new(&account, catalog.symbol_of(&account));

        if let ApplyOutcome::Stale {
            last_slot,
            valid_slot,
        } = catalog.apply(account)
        {
            stats.stale += 1;
            increment(CounterMetric::StaleUpdates);
            tracing::warn!(
                symbol = %event.symbol,
                update_slot = event.last_slot,
                stored_slot = last_slot,
                stored_valid_slot = valid_slot,
                "Dropping stale price update"
            );
            return;
        }

        stats.routed += 1;
        increment(CounterMetric::UpdatesRouted);
        tracing::info!(
            symbol = %event.symbol,
            price_type = %event.price_type,
            status = %event.status,
            price = %event.price,
            confidence = %event.confidence,
            last_slot = event.last_slot,
            valid_slot = event.valid_slot,
            "Price update"
        );

        self.forward(&event, stats).await;
    }

    async fn forward(&self, event: &PriceEvent, stats: &mut LoopStats) {
        let Some(sink) = &self.sink else {
            return;
        };

        match sink.send(&BroadcastMessage::from(event)).await {
            Ok(()) => {
                stats.forwarded += 1;
                increment(CounterMetric::Forwarded);
            }
            Err(e) => {
                stats.forward_failures += 1;
                increment(CounterMetric::ForwardFailures);
                tracing::warn!(symbol = %event.symbol, error = %e, "Failed to forward price update");
            }
        }
    }
}
