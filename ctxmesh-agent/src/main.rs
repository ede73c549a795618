//! ctxmesh-agent - serves one simulated cluster to operator consoles over TCP

use anyhow::{Context, Result};
use clap::Parser;
use ctxmesh::{ClusterConfig, CommandRouter};
use ctxmesh_agent::{serve, AgentState};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "ctxmesh-agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serve a ctxmesh cluster to operator consoles", long_about = None)]
struct Args {
    #[arg(short, long, help = "Cluster configuration file (YAML)")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Listen address, overrides the configuration")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("ctxmesh-agent v{} starting...", ctxmesh::VERSION);

    let mut config = ClusterConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    let router = CommandRouter::new(config)?;
    let state = Arc::new(AgentState::new(router));

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        on_signal.cancel();
    });

    info!("ctxmesh-agent running. Press Ctrl+C to exit.");
    serve(listener, state, shutdown).await?;

    info!("ctxmesh-agent stopped");
    Ok(())
}
