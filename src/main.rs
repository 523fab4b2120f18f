use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use ptystream::cli::Cli;
use ptystream::server::shutdown::shutdown_on_signal;
use ptystream::server::{init_tracing, Server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = cli.load_config()?;
    let spec = cli.spawn_override()?;

    let server = Server::bind(&config, spec)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = shutdown_on_signal(Arc::clone(&shutdown)).await {
            tracing::warn!("Signal handler failed: {}", e);
            shutdown.signal_shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
