//! beacon - bridges editor collaboration sessions to a local presence daemon

mod activity;
mod clipboard;
mod config;
mod editor;
mod manager;
mod protocol;
mod session;
mod transport;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use manager::ConnectionManager;
use std::sync::Arc;
use transport::IpcConnector;

#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "Bridges editor collaboration sessions to a local presence daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Daemon socket path override
    #[arg(short, long)]
    socket: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the presence daemon and run until interrupted
    Run,
    /// Enable presence broadcasting in the config file
    Enable,
    /// Disable presence broadcasting in the config file
    Disable,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Enable) => set_enabled(true),
        Some(Commands::Disable) => set_enabled(false),
        Some(Commands::Run) | None => run(cli.socket).await,
    }
}

/// Flip `presence.enabled` in the config file
fn set_enabled(enabled: bool) -> Result<()> {
    let mut config = Config::load()?;
    config.presence.enabled = enabled;
    config.store()?;
    println!(
        "Presence broadcasting {}.",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Connect and bridge until interrupted
async fn run(socket_override: Option<std::path::PathBuf>) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(socket) = socket_override {
        config.presence.socket_path = Some(socket);
    }

    if !config.presence.enabled {
        println!("Presence broadcasting is disabled; run `beacon enable` first.");
        return Ok(());
    }

    let connector = Arc::new(IpcConnector::new(config.socket_path()));
    let mut manager = ConnectionManager::new(config, connector);

    manager.login().await?;

    tokio::select! {
        result = manager.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    manager.dispose().await;
    Ok(())
}
