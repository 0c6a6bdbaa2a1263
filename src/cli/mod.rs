//! CLI interface for pyth-stream
//!
//! Provides subcommands for:
//! - `dump`: Stream prices to the log
//! - `serve`: Stream prices and re-broadcast them to a WebSocket listener
//! - `config`: Show configuration

mod dump;
mod serve;

pub use dump::DumpArgs;
pub use serve::ServeArgs;

use crate::config::{AccountSelection, Config, SubscriptionModeRequest};
use crate::oracle::RpcAccountSource;
use crate::relay::{Relay, RelayOutcome, RelaySettings};
use crate::watch::RpcWatchSession;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "pyth-stream")]
#[command(about = "Live Pyth price streaming with WebSocket re-broadcast")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream prices to the log
    Dump(DumpArgs),
    /// Stream prices and re-broadcast them to a WebSocket listener
    Serve(ServeArgs),
    /// Show configuration
    Config,
}

/// Options shared by the streaming commands; each overrides the config file
#[derive(Args, Debug, Default)]
pub struct StreamArgs {
    /// Network name used for key resolution
    #[arg(long)]
    pub network: Option<String>,

    /// Subscription mode
    #[arg(long, value_enum)]
    pub mode: Option<SubscriptionModeRequest>,

    /// Price accounts to subscribe to in per-account mode
    #[arg(long, value_enum)]
    pub selection: Option<AccountSelection>,

    /// Maximum number of products to enumerate
    #[arg(long)]
    pub max_products: Option<usize>,
}

impl StreamArgs {
    pub fn settings(&self, config: &Config) -> RelaySettings {
        RelaySettings {
            network: self
                .network
                .clone()
                .unwrap_or_else(|| config.network.name.clone()),
            mode: self.mode.unwrap_or(config.bootstrap.mode),
            selection: self.selection.unwrap_or(config.bootstrap.selection),
            max_products: self.max_products.or(config.bootstrap.max_products),
            update_loop: config.stream.update_loop(),
        }
    }
}

/// Token cancelled on ctrl-c; the handler does nothing else
pub fn shutdown_on_ctrl_c() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    shutdown
}

/// Run `relay` against the configured Solana endpoints
async fn run_relay(relay: Relay, config: &Config) -> anyhow::Result<()> {
    let resolver = config.key_resolver();
    let mut session = RpcWatchSession::new(config.ws_config())
        .with_commitment(config.network.commitment.clone())
        .with_connect_timeout(config.stream.connect_timeout());

    let rpc_url = config.network.rpc_url.clone();
    let commitment = config.network.commitment.clone();
    let outcome = relay
        .run(
            &resolver,
            |keys| {
                let source =
                    RpcAccountSource::new(rpc_url, keys.mapping).with_commitment(commitment);
                match keys.program {
                    Some(program) => source.with_program(program),
                    None => source,
                }
            },
            &mut session,
        )
        .await?;

    match outcome {
        RelayOutcome::MissingMappingKey(e) => {
            eprintln!("Cannot stream prices: {e}");
        }
        RelayOutcome::Finished(report) => {
            tracing::info!(
                mode = %report.mode,
                subscriptions = report.subscriptions,
                products = report.products,
                prices = report.prices,
                routed = report.stats.routed,
                forwarded = report.stats.forwarded,
                "Relay finished"
            );
        }
    }
    Ok(())
}
