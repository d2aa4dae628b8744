//! MongoDB gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                       GATEWAY                        │
//!                  │                                                      │
//!   HTTP request   │  ┌──────────┐    ┌──────────┐    ┌────────────────┐  │
//!   ───────────────┼─▶│   http   │───▶│ gateway  │───▶│    dispatch    │  │
//!   WS event       │  │ server / │    │ (per-call│    │ validate/exec/ │  │
//!   ───────────────┼─▶│ websocket│    │  states) │    │   normalize    │  │
//!                  │  └──────────┘    └────┬─────┘    └───────┬────────┘  │
//!                  │                       │                  │           │
//!                  │                       ▼                  ▼           │
//!                  │                 ┌──────────┐      ┌─────────────┐    │    ┌─────────┐
//!                  │                 │  broker  │─────▶│    store    │────┼───▶│ MongoDB │
//!                  │                 │acquire / │      │ (connector, │    │    └─────────┘
//!                  │                 │ release  │      │  session)   │    │
//!                  │                 └──────────┘      └─────────────┘    │
//!                  │                                                      │
//!                  │  config · observability · lifecycle                  │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use doc_gateway::broker::Broker;
use doc_gateway::config::resolve_config;
use doc_gateway::lifecycle::{wait_for_signal, Shutdown};
use doc_gateway::observability::{logging, metrics};
use doc_gateway::store::MongoConnector;
use doc_gateway::{Gateway, HttpServer};

#[derive(Parser)]
#[command(name = "doc-gateway")]
#[command(about = "HTTP and WebSocket gateway for MongoDB operations", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = resolve_config(cli.config.as_deref(), cli.bind)?;

    logging::init_logging(&config.observability);
    tracing::info!("doc-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        probe_timeout_ms = config.broker.probe_timeout_ms,
        request_timeout_secs = config.timeouts.request_secs,
        max_sessions = config.session.max_sessions,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let connector = Arc::new(MongoConnector::new(&config.broker));
    let gateway = Gateway::new(Broker::new(connector, &config.broker));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.trigger();
    });

    let server = HttpServer::new(config, gateway, shutdown);
    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
