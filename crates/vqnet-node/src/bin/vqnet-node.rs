//! vqnet node server.
//!
//! Serves one node of a configured network over TCP until Ctrl-C.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use vqnet_node::{
    Config, DEFAULT_NETWORK, Node, TcpConnector, TracingConfig, init_tracing, serve,
};

/// Run one node of a virtual-qubit network
#[derive(Parser)]
#[command(name = "vqnet-node")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Name of the node to run, as listed in the network configuration
    #[arg(short, long)]
    name: String,

    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// Network to join
    #[arg(long, default_value = DEFAULT_NETWORK)]
    network: String,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    let mut tracing_config = TracingConfig::from_logging(&config.logging);
    match cli.verbose {
        0 => {}
        1 => tracing_config.log_level = "info".into(),
        2 => tracing_config.log_level = "debug".into(),
        _ => tracing_config.log_level = "trace".into(),
    }
    init_tracing(tracing_config).map_err(|e| anyhow::anyhow!("initializing tracing: {e}"))?;

    let network = config.network(&cli.network)?.clone();
    let endpoint = network
        .endpoint(&cli.name)
        .with_context(|| format!("{} is not part of network '{}'", cli.name, cli.network))?
        .clone();

    let node = Node::new(
        &cli.name,
        network,
        config.settings.clone(),
        Arc::new(TcpConnector),
    )?;
    let listener = TcpListener::bind(endpoint.address())
        .await
        .with_context(|| format!("binding {endpoint}"))?;
    info!(node = %cli.name, %endpoint, network = %cli.network, "Node listening");

    let dialer = Arc::clone(&node);
    tokio::spawn(async move {
        match dialer.connect_all().await {
            Ok(()) => info!("All peers reachable"),
            Err(e) => error!(error = %e, "Could not reach every peer"),
        }
    });

    tokio::select! {
        result = serve(node, listener) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}
