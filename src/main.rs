//! Plotter gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                  GATEWAY                          │
//!   POST /data           │  ┌────────┐   ┌─────────┐   ┌──────────────────┐ │
//!   ─────────────────────┼─▶│  http  │──▶│ request │──▶│   multiplexer    │ │
//!   WS /dataws           │  │ server │   │  parse  │   │ admission + ids  │ │
//!   ─────────────────────┼─▶│        │   └─────────┘   └────────┬─────────┘ │
//!                        │  └────────┘                          │ frames    │
//!                        │      ▲                               ▼           │
//!                        │      │ sink     ┌─────────────┐  ┌──────────┐    │     Database
//!                        │      └──────────│ dispatcher  │◀─│   pool   │◀───┼───▶ (binary
//!                        │   JSON / error  │ (per conn)  │  │ N conns  │    │      protocol)
//!                        │                 └─────────────┘  └──────────┘    │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use plotter_gateway::config::{load_or_default, validate_config, ConfigSource};
use plotter_gateway::lifecycle::shutdown_signal;
use plotter_gateway::observability::{logging, metrics};
use plotter_gateway::{GatewayServer, Multiplexer};

#[derive(Parser, Debug)]
#[command(name = "plotter-gateway", about = "HTTP/WebSocket gateway for plotting queries", version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Override the listener bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the database address
    #[arg(long)]
    backend: Option<String>,

    /// Override the directory of static plotter files
    #[arg(long)]
    plotter_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (mut config, source) = load_or_default(&args.config)?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(backend) = args.backend {
        config.backend.address = backend;
    }
    if let Some(dir) = args.plotter_dir {
        config.static_files.plotter_dir = dir.display().to_string();
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!("plotter-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    if source == ConfigSource::Defaults {
        tracing::warn!(path = %args.config.display(), "Configuration file not found, using defaults");
    }

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(error = %error, "Invalid configuration");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.address,
        connections = config.backend.connections,
        max_pending = config.backend.max_pending,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let multiplexer = match Multiplexer::connect(&config.backend).await {
        Ok(multiplexer) => Arc::new(multiplexer),
        Err(e) => {
            tracing::error!(error = %e, "Could not connect to the database");
            return Err(e.into());
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = GatewayServer::new(&config, multiplexer);
    server.run(listener, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
