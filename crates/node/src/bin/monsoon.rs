//! The Monsoon validator binary.
//!
//! ```bash
//! monsoon --config node.json
//! monsoon --version
//! ```
//!
//! The config file is a JSON object keyed by module name; the genesis file
//! is resolved from its `base` section. Exits 0 on clean shutdown and 1 on
//! a fatal initialization or runtime error.

use anyhow::{Context, Result};
use clap::Parser;
use monsoon_node::transport::{TcpTransport, Transport};
use monsoon_node::{init_telemetry, spawn_node, NodeConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Monsoon validator node.
#[derive(Parser, Debug)]
#[command(name = "monsoon", version, about, long_about = None)]
struct Cli {
    /// Relative or absolute path to the config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    // --version is handled by clap before we get here.
    let Some(config_path) = cli.config else {
        eprintln!("--config <path> is required (or use --version)");
        std::process::exit(1);
    };

    if let Err(error) = run(config_path) {
        eprintln!("fatal: {error:#}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn run(config_path: PathBuf) -> Result<()> {
    let config = NodeConfig::load(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    init_telemetry(&config.telemetry);

    let genesis = config.load_genesis().context("loading genesis")?;

    let (inbound_tx, inbound_rx) = mpsc::channel(1024);
    let transport: Arc<dyn Transport> = Arc::new(TcpTransport::new());

    if !config.p2p.is_empty_connection_type {
        let port = config.p2p.consensus_port;
        tokio::spawn(async move {
            if let Err(listen_error) = TcpTransport::listen(port, inbound_tx).await {
                error!(%listen_error, "transport listener failed");
            }
        });
    }

    let mut handle = spawn_node(&config, &genesis, transport, inbound_rx)
        .context("starting node modules")?;
    info!(address = %handle.address, "node running; ctrl-c to stop");

    signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down");
    handle.shutdown();
    Ok(())
}
