//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the rerank proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// The search engine sitting behind the proxy.
    pub upstream: UpstreamConfig,

    /// Local status endpoint.
    pub status: StatusConfig,

    /// Which requests are intercepted and where the interesting JSON lives.
    pub search: SearchConfig,

    /// Ranking model selection.
    pub model: ModelConfig,

    /// Size limits for buffered messages.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            max_connections: 1_024,
        }
    }
}

/// Upstream server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address as `host:port`.
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9200".to_string(),
        }
    }
}

/// Status endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Exact path answered locally with a JSON status document.
    pub path: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            path: "/rerank/status".to_string(),
        }
    }
}

/// Search interception settings.
///
/// Pointers follow RFC 6901 (`serde_json::Value::pointer`). An empty pointer
/// refers to the whole value.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Path globs that identify the search API. `*` matches one segment.
    pub paths: Vec<String>,

    /// Location of the query string in the request body.
    pub query_pointer: String,

    /// URL parameter consulted when the body carries no query.
    pub query_param: String,

    /// Location of the requested result count in the request body.
    pub size_pointer: String,

    /// Location of the candidate array in the upstream response body.
    pub choices_pointer: String,

    /// Location of the rankable text inside each candidate.
    pub choice_text_pointer: String,

    /// Result count used when the request does not ask for one.
    pub default_top_k: usize,

    /// Factor applied to the requested size before asking upstream.
    pub multiplier: usize,

    /// Attach ranking details to rewritten responses.
    pub debug: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            paths: vec!["/_search".to_string(), "/*/_search".to_string()],
            query_pointer: "/query".to_string(),
            query_param: "q".to_string(),
            size_pointer: "/size".to_string(),
            choices_pointer: "/choices".to_string(),
            choice_text_pointer: String::new(),
            default_top_k: 10,
            multiplier: 1,
            debug: false,
        }
    }
}

/// Ranking model selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Registry identifier of the model backend.
    pub name: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "lexical".to_string(),
        }
    }
}

/// Size limits for buffered messages.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of a request or response header section.
    pub max_header_bytes: usize,

    /// Maximum size of a buffered request, or of a search response.
    pub max_message_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_message_bytes: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Maximum silence on either socket while a message is in flight, in seconds.
    pub idle_secs: u64,

    /// How long shutdown waits for in-flight connections, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            idle_secs: 60,
            shutdown_grace_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
