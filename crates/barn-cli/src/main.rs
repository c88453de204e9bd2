/*!
 * Alpaca Barn server
 *
 * Loads the configuration, builds the drivers and serves them over the
 * Alpaca REST API, with UDP discovery and periodic background refresh.
 */
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use barn_api::AppState;
use barn_core::config::{Config, ConfigBuilder};
use barn_core::logging;
use barn_devices::discovery::{DiscoveryPorts, DiscoveryResponder};
use barn_devices::Barn;
use barn_engine::RefreshScheduler;

/// Alpaca Barn gateway
#[derive(Parser, Debug)]
#[command(name = "barn")]
#[command(about = "ASCOM Alpaca gateway for safety monitors and weather stations", long_about = None)]
struct Args {
    /// Configuration file, or base name to search for (barn.yaml, barn.toml, barn.json)
    #[arg(short, long, default_value = "barn")]
    config: PathBuf,

    /// Alpaca REST port
    #[arg(long)]
    api_port: Option<u32>,

    /// UDP discovery port
    #[arg(long)]
    discovery_port: Option<u32>,

    /// Log filter (e.g. "info", "debug", "barn_api=trace")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Don't answer discovery probes
    #[arg(long)]
    no_discovery: bool,
}

impl Args {
    /// Layer command-line flags over file and environment settings
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.api_port {
            config.api.port = port;
        }
        if let Some(port) = self.discovery_port {
            config.discovery.port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.no_discovery {
            config.discovery.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ConfigBuilder::new()
        .with_config_file(&args.config)
        .with_environment_prefix("BARN")
        .build()
        .context("Failed to load configuration")?;
    args.apply(&mut config);

    logging::init_with_filter(&config.logging.level, config.logging.json_format)?;
    info!("Starting Alpaca Barn v{}", env!("CARGO_PKG_VERSION"));

    let ports = DiscoveryPorts::new(config.discovery.port, config.api.port);

    let barn = Arc::new(Barn::from_config(&config.monitors, &config.weather).await?);
    info!(
        monitors = barn.monitors().len()?,
        stations = barn.weather().len()?,
        "Drivers ready"
    );

    let state = AppState::new(Arc::clone(&barn), config.general.clone())?;

    let scheduler = RefreshScheduler::new(Arc::clone(&barn), config.refresh.interval());
    scheduler.start().await?;

    let discovery = if config.discovery.enabled {
        match DiscoveryResponder::bind(ports).await {
            Ok(responder) => Some(tokio::spawn(responder.run())),
            Err(e) => {
                error!("Failed to start discovery responder: {}", e);
                None
            }
        }
    } else {
        info!("Discovery disabled");
        None
    };

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, ports.api_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind Alpaca API on {}", addr))?;

    let served = barn_api::serve(listener, state, shutdown_signal()).await;

    scheduler.stop().await?;
    if let Some(discovery) = discovery {
        discovery.abort();
    }

    served?;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
}
