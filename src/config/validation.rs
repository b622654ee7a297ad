//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, multiplier >= 1)
//! - Check that paths and pointers are well-formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Model names are checked later, against the registry

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// Human readable explanation.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be at least 1"));
    }

    if !has_port(&config.upstream.address) {
        errors.push(ValidationError::new(
            "upstream.address",
            format!("'{}' must be host:port", config.upstream.address),
        ));
    }

    if !config.status.path.starts_with('/') {
        errors.push(ValidationError::new("status.path", "must start with '/'"));
    }

    let search = &config.search;
    if search.paths.is_empty() {
        errors.push(ValidationError::new("search.paths", "at least one pattern is required"));
    }
    if search.paths.iter().any(|p| !p.starts_with('/')) {
        errors.push(ValidationError::new("search.paths", "patterns must start with '/'"));
    }
    if search.paths.iter().any(|p| *p == config.status.path) {
        errors.push(ValidationError::new("search.paths", "must not contain the status path"));
    }
    for (field, pointer) in [
        ("search.query_pointer", &search.query_pointer),
        ("search.size_pointer", &search.size_pointer),
        ("search.choices_pointer", &search.choices_pointer),
        ("search.choice_text_pointer", &search.choice_text_pointer),
    ] {
        if !pointer.is_empty() && !pointer.starts_with('/') {
            errors.push(ValidationError::new(field, "JSON pointers must be empty or start with '/'"));
        }
    }
    if search.default_top_k == 0 {
        errors.push(ValidationError::new("search.default_top_k", "must be at least 1"));
    }
    if search.multiplier == 0 {
        errors.push(ValidationError::new("search.multiplier", "must be at least 1"));
    }

    if config.model.name.trim().is_empty() {
        errors.push(ValidationError::new("model.name", "must not be empty"));
    }

    if config.limits.max_header_bytes == 0 {
        errors.push(ValidationError::new("limits.max_header_bytes", "must be positive"));
    }
    if config.limits.max_message_bytes < config.limits.max_header_bytes {
        errors.push(ValidationError::new(
            "limits.max_message_bytes",
            "must not be smaller than max_header_bytes",
        ));
    }

    if config.timeouts.connect_secs == 0 || config.timeouts.idle_secs == 0 {
        errors.push(ValidationError::new("timeouts", "connect_secs and idle_secs must be positive"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn has_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
