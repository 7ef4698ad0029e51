//! Node process entrypoint: parse CLI args, load config, start the node,
//! and wait for a shutdown signal.

use std::path::PathBuf;

use clap::Parser;
use labelmesh_node::{Node, NodeConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "labelmesh-node", about = "An information-centric network node")]
struct Args {
    /// Path to a TOML config file (spec.md §6).
    #[arg(long, default_value = "labelmesh.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = NodeConfig::load(&args.config)?;

    let node = Node::start(config.clone()).await?;

    if let Some(port) = config.debug_port {
        let handle = node.handle.clone();
        tokio::spawn(labelmesh_node::debug::serve_debug(port, handle));
    }

    wait_for_shutdown_signal().await;
    tracing::info!("shutting down");
    node.shutdown().await;
    Ok(())
}

/// Wait for Ctrl-C or, on Unix, SIGTERM/SIGHUP — whichever arrives
/// first. The teacher has no comparable signal-handling code (it's a
/// Tauri app, not a long-running daemon), so this follows tokio's own
/// signal module conventions directly.
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut hup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
        _ = hup.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
