//! Accept loop for the proxy.
//!
//! # Responsibilities
//! - Resolve the configured ranking model once at startup
//! - Accept connections and spawn one handler task per connection
//! - Stop on shutdown or when the listening socket closes
//! - Drain in-flight connections within the grace period

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::ProxyConfig;
use crate::http::handler::{self, ProxyContext};
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::ranking::{ModelRegistry, RankError, Ranker};

/// Pause after a transient accept error before accepting again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// The selective re-ranking proxy.
pub struct ProxyServer {
    ctx: Arc<ProxyContext>,
}

impl ProxyServer {
    /// Create a server using the built-in model registry.
    pub fn new(config: ProxyConfig) -> Result<Self, RankError> {
        Self::with_registry(config, &ModelRegistry::builtin())
    }

    /// Create a server, resolving `config.model` against `registry`.
    pub fn with_registry(config: ProxyConfig, registry: &ModelRegistry) -> Result<Self, RankError> {
        let ranker = registry.create(&config.model)?;
        Ok(Self::with_ranker(config, ranker))
    }

    /// Create a server around an already constructed model.
    pub fn with_ranker(config: ProxyConfig, ranker: Arc<dyn Ranker>) -> Self {
        tracing::info!(
            model = ranker.name(),
            upstream = %config.upstream.address,
            status_path = %config.status.path,
            "Proxy configured"
        );
        Self {
            ctx: Arc::new(ProxyContext::new(config, ranker)),
        }
    }

    /// Tracker of in-flight connections.
    pub fn tracker(&self) -> ConnectionTracker {
        self.ctx.tracker.clone()
    }

    /// Run the accept loop until `shutdown` fires or the listener closes.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Proxy accepting connections");

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.recv() => {
                    tracing::debug!("Shutdown signal received, stopping accept loop");
                    break;
                }
            };

            match accepted {
                Ok((stream, peer, permit)) => {
                    let guard = self.ctx.tracker.track();
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        handler::handle_connection(ctx, stream, peer, guard.id()).await;
                        drop(guard);
                        drop(permit);
                    });
                }
                Err(ListenerError::Closed) => {
                    tracing::debug!("Listener closed, stopping accept loop");
                    break;
                }
                Err(ListenerError::Accept(e)) if is_closed(&e) => {
                    tracing::debug!(error = %e, "Listening socket closed, stopping accept loop");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        let grace = Duration::from_secs(self.ctx.config.timeouts.shutdown_grace_secs);
        if self.ctx.tracker.wait_idle(grace).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(
                remaining = self.ctx.tracker.active_count(),
                "Grace period elapsed with connections still in flight"
            );
        }
        Ok(())
    }
}

fn is_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotConnected | io::ErrorKind::InvalidInput | io::ErrorKind::BrokenPipe
    )
}
