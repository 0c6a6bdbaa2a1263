//! Serve command implementation

use super::{run_relay, shutdown_on_ctrl_c, StreamArgs};
use crate::broadcast::{ListenerServer, ListenerSlot};
use crate::config::Config;
use crate::relay::Relay;
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// Listener address, e.g. 127.0.0.1:6789
    #[arg(long)]
    pub bind: Option<String>,
}

impl ServeArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let shutdown = shutdown_on_ctrl_c();
        let bind = self.bind.as_deref().unwrap_or(&config.server.bind);

        let slot = Arc::new(ListenerSlot::new());
        let server = ListenerServer::bind(bind, slot.clone(), config.server.listener_buffer).await?;
        tracing::info!(addr = %server.local_addr()?, "Waiting for a listener");
        let server_task = tokio::spawn(server.run(shutdown.clone()));

        let relay = Relay::new(self.stream.settings(config), shutdown.clone()).with_sink(slot);
        let relayed = run_relay(relay, config).await;

        // Stop accepting listeners whichever way the relay ended
        shutdown.cancel();
        let served = server_task.await?;
        relayed?;
        served?;
        Ok(())
    }
}
