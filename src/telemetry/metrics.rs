//! Prometheus metrics

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Price updates applied to the catalog
    UpdatesRouted,
    /// Accounts discovered under a program subscription
    Discoveries,
    /// Price updates older than the stored state
    StaleUpdates,
    /// Messages handed to the sink
    Forwarded,
    /// Messages the sink refused
    ForwardFailures,
    /// Listener connections accepted
    ListenersAccepted,
}

impl CounterMetric {
    const fn name(self) -> &'static str {
        match self {
            CounterMetric::UpdatesRouted => "pyth_stream_updates_routed_total",
            CounterMetric::Discoveries => "pyth_stream_discoveries_total",
            CounterMetric::StaleUpdates => "pyth_stream_stale_updates_total",
            CounterMetric::Forwarded => "pyth_stream_forwarded_total",
            CounterMetric::ForwardFailures => "pyth_stream_forward_failures_total",
            CounterMetric::ListenersAccepted => "pyth_stream_listeners_accepted_total",
        }
    }
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// 1 while a listener is attached
    ListenerAttached,
    /// Price accounts in the catalog
    CatalogPrices,
    /// Subscriptions requested by bootstrap
    Subscriptions,
}

impl GaugeMetric {
    const fn name(self) -> &'static str {
        match self {
            GaugeMetric::ListenerAttached => "pyth_stream_listener_attached",
            GaugeMetric::CatalogPrices => "pyth_stream_catalog_prices",
            GaugeMetric::Subscriptions => "pyth_stream_subscriptions",
        }
    }
}

/// Start the Prometheus exporter on `port`
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;

    describe_counter!(
        CounterMetric::UpdatesRouted.name(),
        "Price updates applied to the catalog"
    );
    describe_counter!(
        CounterMetric::Discoveries.name(),
        "Accounts discovered under a program subscription"
    );
    describe_counter!(
        CounterMetric::StaleUpdates.name(),
        "Price updates older than the stored state"
    );
    describe_counter!(CounterMetric::Forwarded.name(), "Messages handed to the sink");
    describe_counter!(
        CounterMetric::ForwardFailures.name(),
        "Messages the sink refused"
    );
    describe_counter!(
        CounterMetric::ListenersAccepted.name(),
        "Listener connections accepted"
    );
    describe_gauge!(
        GaugeMetric::ListenerAttached.name(),
        "1 while a listener is attached"
    );
    describe_gauge!(GaugeMetric::CatalogPrices.name(), "Price accounts in the catalog");
    describe_gauge!(GaugeMetric::Subscriptions.name(), "Active subscriptions");

    tracing::info!(%addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    increment_by(metric, 1);
}

pub fn increment_by(metric: CounterMetric, value: u64) {
    counter!(metric.name()).increment(value);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    gauge!(metric.name()).set(value);
}
