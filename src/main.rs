//! Caching forward HTTP proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌────────────────────────────────────────────────┐
//!                  │                 CACHING PROXY                  │
//!                  │                                                │
//!   HTTP client    │  ┌──────────┐   ┌───────────┐   ┌──────────┐  │
//!   ───────────────┼─▶│ listener │──▶│ admission │──▶│ pipeline │  │
//!   (port P)       │  └──────────┘   │   gate    │   └────┬─────┘  │
//!                  │                 └───────────┘        │        │
//!                  │                             hit ┌────▼─────┐  │
//!                  │                            ┌────│  cache   │  │
//!                  │                            │    └────┬─────┘  │
//!                  │                            │    miss │        │
//!                  │  ┌──────────┐              │    ┌────▼─────┐  │
//!   ◀──────────────┼──│ response │◀─────────────┴────│ upstream │──┼──▶ Origin
//!                  │  └──────────┘                   │ fetcher  │  │
//!                  │                                 └──────────┘  │
//!                  │  ┌──────────┐   ┌───────────┐                 │
//!   raw client     │  │   raw    │──▶│  tunnel   │◀────────────────┼──▶ CONNECT
//!   ───────────────┼─▶│ listener │   │ (bridge)  │                 │    target
//!   (port P+1)     │  └──────────┘   └───────────┘                 │
//!                  └────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use caching_proxy::config::{load_config, validation::validate_config};
use caching_proxy::observability::metrics;
use caching_proxy::{ProxyConfig, ProxyServer, Shutdown};

#[derive(Parser)]
#[command(name = "caching-proxy")]
#[command(about = "Caching forward HTTP proxy with CONNECT tunneling", long_about = None)]
struct Cli {
    /// HTTP proxy port; the raw socket listener binds port + 1.
    port: Option<u16>,

    /// Optional TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address for the Prometheus metrics exporter.
    #[arg(long)]
    metrics: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caching_proxy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(port) = cli.port {
        config.listener.http_port = port;
    }
    if let Err(errors) = validate_config(&config) {
        for err in &errors {
            tracing::error!("{err}");
        }
        return Err("invalid configuration".into());
    }

    metrics::init_metrics(cli.metrics.or(config.observability.metrics_address));

    tracing::info!(
        http_port = config.listener.http_port,
        raw_port = config.listener.raw_port(),
        max_clients = config.admission.max_clients,
        cache_capacity_bytes = config.cache.capacity_bytes,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let server = ProxyServer::new(config)?;
    let (http_listener, raw_listener) = server.bind().await?;
    server
        .run(http_listener, raw_listener, shutdown.subscribe())
        .await;

    tracing::info!("Proxy stopped");
    Ok(())
}
