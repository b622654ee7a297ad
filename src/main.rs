//! Rerank proxy
//!
//! A selective reverse proxy in front of a search engine, built on Tokio.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌───────────────────────────────────────────────────┐
//!                         │                   RERANK PROXY                    │
//!                         │                                                   │
//!     Client Request      │  ┌─────────┐    ┌─────────┐    ┌────────────┐     │
//!     ────────────────────┼─▶│   net   │───▶│  http   │───▶│  routing   │     │
//!                         │  │listener │    │ handler │    │ classifier │     │
//!                         │  └─────────┘    └────┬────┘    └────────────┘     │
//!                         │                      │                            │
//!                         │          passthrough │ search                     │
//!                         │                      ▼                            │
//!     Client Response     │  ┌─────────┐    ┌─────────┐    ┌────────────┐     │
//!     ◀───────────────────┼──│response │◀───│ ranking │◀───│   relay    │◀────┼──── Search
//!                         │  │ rewrite │    │  model  │    │  capture   │     │     Engine
//!                         │  └─────────┘    └─────────┘    └────────────┘     │
//!                         │                                                   │
//!                         │  config · observability · lifecycle               │
//!                         └───────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use rerank_proxy::config::{load_config, validate_config, ConfigError, ProxyConfig};
use rerank_proxy::lifecycle::{signals, Shutdown};
use rerank_proxy::net::Listener;
use rerank_proxy::observability::{logging, metrics};
use rerank_proxy::ProxyServer;

#[derive(Parser, Debug)]
#[command(name = "rerank-proxy", version)]
#[command(about = "Selective re-ranking reverse proxy for search engines", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(long)]
    listen: Option<String>,

    /// Override upstream.address
    #[arg(long)]
    upstream: Option<String>,

    /// Override model.name
    #[arg(long)]
    model: Option<String>,

    /// Override observability.log_level
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut ProxyConfig) {
        if let Some(listen) = self.listen {
            config.listener.bind_address = listen;
        }
        if let Some(upstream) = self.upstream {
            config.upstream.address = upstream;
        }
        if let Some(model) = self.model {
            config.model.name = model;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut cli = Cli::parse();

    let mut config = match cli.config.take() {
        Some(path) => load_config(&path)?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability.log_level)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rerank-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        upstream = %config.upstream.address,
        model = %config.model.name,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = ProxyServer::new(config)?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
