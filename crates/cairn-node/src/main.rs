//! Cairn Node - repository hosting control plane.

use anyhow::Context;
use cairn_node::observability::{init_logging, LogFormat};
use cairn_node::settings::Settings;
use cairn_node::Node;
use clap::Parser;
use std::path::PathBuf;

/// Cairn Node - repository registry, permissions and federation
#[derive(Parser, Debug)]
#[command(name = "cairn-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("failed to load settings")?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| settings.logging.level.clone());
    init_logging(&level, args.json_logs || settings.logging.format == LogFormat::Json);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Cairn node");
    tracing::info!(
        repositories = %settings.git.repositories_folder.display(),
        caching = settings.git.registry.cache_repository_list,
        federation = !settings.federation.passphrase.is_empty(),
        "Node configuration"
    );

    let node = Node::build(settings)?;
    let scheduler = node.start()?;
    tracing::info!("Node is ready. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutting down");
    scheduler.shutdown().await;
    Ok(())
}
