//! Dump command implementation

use super::{run_relay, shutdown_on_ctrl_c, StreamArgs};
use crate::config::Config;
use crate::relay::Relay;
use clap::Args;

#[derive(Args, Debug)]
pub struct DumpArgs {
    #[command(flatten)]
    pub stream: StreamArgs,
}

impl DumpArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        tracing::info!("Streaming prices to the log");
        let relay = Relay::new(self.stream.settings(config), shutdown_on_ctrl_c());
        run_relay(relay, config).await
    }
}
