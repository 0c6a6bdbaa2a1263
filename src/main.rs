use clap::Parser;
use pyth_stream::cli::{Cli, Commands};
use pyth_stream::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using bundled devnet configuration");
            Config::bundled()?
        }
    };

    // Initialize telemetry
    pyth_stream::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Dump(args) => {
            args.execute(&config).await?;
        }
        Commands::Serve(args) => {
            tracing::info!("Starting price relay");
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  Network: {} ({}, {})",
                config.network.name, config.network.rpc_url, config.network.ws_url
            );
            println!("  Commitment: {}", config.network.commitment);
            for (network, keys) in &config.keys {
                let show = |key: Option<pyth_stream::oracle::AccountKey>| {
                    key.map(|k| k.to_string()).unwrap_or_else(|| "-".to_string())
                };
                println!(
                    "  Keys[{}]: mapping={} program={}",
                    network,
                    show(keys.mapping),
                    show(keys.program)
                );
            }
            println!(
                "  Bootstrap: mode={:?} selection={:?} max_products={:?}",
                config.bootstrap.mode, config.bootstrap.selection, config.bootstrap.max_products
            );
            println!("  Listener: {}", config.server.bind);
        }
    }

    Ok(())
}
