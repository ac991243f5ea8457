//! Log hub relay binary
//!
//! Usage:
//!   relay
//!   relay --config config/relay.toml
//!   relay --bind 0.0.0.0:5000 --json-logs

use anyhow::{Context, Result};
use clap::Parser;
use relays::{RelayConfig, RelayServer};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(about = "Log hub group fan-out relay")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address from the configuration
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting log hub relay");

    let mut config = match &args.config {
        Some(path) => {
            info!("Configuration: {}", path.display());
            RelayConfig::from_file(path).map_err(|e| {
                error!("Failed to load configuration: {}", e);
                e
            })?
        }
        None => RelayConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.transport.bind_address = bind.clone();
    }

    let server = RelayServer::bind(&config)
        .await
        .with_context(|| format!("Failed to bind {}", config.transport.bind_address))?;
    info!(
        "Relay '{}' accepting sessions on {} (max {} sessions)",
        config.relay.name,
        server.local_addr()?,
        config.relay.max_sessions
    );

    let shutdown = server.shutdown_token();
    let relay = server.relay().clone();
    let server_handle = tokio::spawn(server.run());

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for CTRL+C")?;
            info!("Received shutdown signal");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Relay failed: {}", e),
        Err(e) => error!("Relay task panicked: {}", e),
    }

    let stats = relay.stats();
    info!(
        "Relay stopped: {} batches routed, {} deliveries, {} dropped",
        stats.batches_routed, stats.deliveries, stats.dropped_deliveries
    );
    Ok(())
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_lowercase()));

    if args.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
