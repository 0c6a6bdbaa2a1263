//! Configuration types for pyth-stream

use crate::oracle::{AccountKey, ConfigKeyResolver, DEFAULT_COMMITMENT};
use crate::stream::UpdateLoopConfig;
use crate::telemetry::LogFormat;
use crate::ws::WsConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Bundled configuration used when no file is found
pub const DEFAULT_CONFIG: &str = include_str!("../config.toml.example");

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    /// Well-known keys per network name
    #[serde(default)]
    pub keys: HashMap<String, NetworkKeys>,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Ledger endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Network name used for key resolution
    pub name: String,
    pub rpc_url: String,
    pub ws_url: String,
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

fn default_commitment() -> String {
    DEFAULT_COMMITMENT.to_string()
}

/// Mapping and program keys of one network
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkKeys {
    pub mapping: Option<AccountKey>,
    pub program: Option<AccountKey>,
}

/// Requested subscription mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionModeRequest {
    /// One subscription per price account
    #[default]
    Accounts,
    /// A single program subscription
    Program,
}

/// Which price accounts to subscribe to in per-account mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AccountSelection {
    #[default]
    All,
    /// Only the first collected price account
    First,
}

/// Subscription bootstrap configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub mode: SubscriptionModeRequest,
    #[serde(default)]
    pub selection: AccountSelection,
    /// Upper bound on enumerated products; unlimited when unset
    pub max_products: Option<usize>,
}

/// Watch session and update loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Reconnect attempts after a lost transport (0 = infinite)
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_max_reconnects() -> u32 {
    10
}
fn default_ping_interval_secs() -> u64 {
    30
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_reconnects: default_max_reconnects(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn update_loop(&self) -> UpdateLoopConfig {
        UpdateLoopConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }
}

/// Listener server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Messages buffered per listener before updates are refused
    #[serde(default = "default_listener_buffer")]
    pub listener_buffer: usize,
}

fn default_bind() -> String {
    "127.0.0.1:6789".to_string()
}
fn default_listener_buffer() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            listener_buffer: default_listener_buffer(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port; disabled when unset
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// The bundled devnet configuration
    pub fn bundled() -> anyhow::Result<Self> {
        Ok(toml::from_str(DEFAULT_CONFIG)?)
    }

    pub fn key_resolver(&self) -> ConfigKeyResolver {
        ConfigKeyResolver::new(self.keys.clone())
    }

    pub fn ws_config(&self) -> WsConfig {
        WsConfig::new(&self.network.ws_url)
            .max_reconnects(self.stream.max_reconnects)
            .ping_interval(Duration::from_secs(self.stream.ping_interval_secs.max(1)))
    }
}
