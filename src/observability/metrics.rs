//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (outcomes, latency, model timing, connections)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_connections_total` (counter): finished connections by outcome
//! - `proxy_connection_duration_seconds` (histogram): connection lifetime by outcome
//! - `proxy_rank_duration_seconds` (histogram): model latency by model
//! - `proxy_rank_failures_total` (counter): failed model invocations by model
//! - `proxy_active_connections` (gauge): current connection count

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::routing::Outcome;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a finished connection.
pub fn record_connection(outcome: Outcome, start: Instant) {
    let outcome = outcome.as_str();
    counter!("proxy_connections_total", "outcome" => outcome).increment(1);
    histogram!("proxy_connection_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

/// Record one model invocation.
pub fn record_rank(model: &str, elapsed: Duration, ok: bool) {
    let model = model.to_string();
    histogram!("proxy_rank_duration_seconds", "model" => model.clone()).record(elapsed.as_secs_f64());
    if !ok {
        counter!("proxy_rank_failures_total", "model" => model).increment(1);
    }
}

pub fn set_active_connections(count: u64) {
    gauge!("proxy_active_connections").set(count as f64);
}
