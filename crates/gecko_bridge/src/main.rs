use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gecko_bridge::Bridge;
use gecko_bridge::Config;
use gecko_bridge::LogLevel;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Bridge that exposes a Gecko in.touch2 spa as HomeKit-style accessories
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "gecko-bridge.toml")]
    config: PathBuf,

    /// Directory for persistent state, overrides `bridge.storage_path`
    #[arg(short = 'U', long)]
    user_storage_path: Option<PathBuf>,

    /// Force debug logging
    #[arg(short = 'D', long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    if cli.debug {
        config.logging.level = LogLevel::Debug;
    }
    if let Some(path) = cli.user_storage_path {
        config.bridge.storage_path = path;
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("gecko-bridge {} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loaded config from: {}", cli.config.display());
    tracing::info!("Storage path: {}", config.bridge.storage_path.display());

    let mut bridge = Bridge::new(&config.bridge);
    bridge.register_platforms_from_config(&config);

    // Start the status API if configured
    let api = config.api.clone().map(|api_config| {
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(gecko_bridge::api::serve(
            api_config.listen,
            api_config.port,
            bridge.name().to_string(),
            bridge.state_handle(),
            shutdown_rx,
        ));
        (shutdown_tx, handle)
    });

    bridge.did_finish_launching();

    tracing::info!("Press Ctrl+C to exit");

    // The event loop runs until the shutdown signal cancels it
    tokio::select! {
        _ = bridge.run() => {}
        res = tokio::signal::ctrl_c() => match res {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        },
    }

    bridge.shutdown().await;

    if let Some((shutdown_tx, handle)) = api {
        let _ = shutdown_tx.send(());
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("HTTP API server failed: {:#}", e),
            Err(e) => tracing::error!("HTTP API task failed: {}", e),
        }
    }

    tracing::info!("gecko-bridge shutdown complete");

    Ok(())
}
