use std::sync::Arc;

use color_eyre::eyre::Result;
use lsp_bridge::cli::Cli;
use lsp_bridge::config::BridgeConfig;
use lsp_bridge::logging;
use lsp_bridge::plugin::{LineChannel, PluginApi};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse_args();
    let config = BridgeConfig::from_cli(&cli)?;
    let _log_guard = logging::init(&config.logging.level, config.logging.file.as_deref())?;

    tracing::info!("lsp-bridge {} starting", env!("CARGO_PKG_VERSION"));

    let channel = Arc::new(LineChannel::stdio());
    let api = PluginApi::new(channel.clone());
    let client = api.create_language_client(
        &config.server.command,
        config.server.initialization_params(),
        config.server.client_options(&config.formatting),
    );

    // Events keep flowing even if the server never comes up
    let start = client.start();
    tokio::spawn(async move {
        if let Err(e) = start.await {
            tracing::error!("Language server unavailable: {}", e);
        }
    });

    channel.run_inbound(tokio::io::stdin()).await?;
    tracing::info!("Host channel closed, exiting");
    Ok(())
}
