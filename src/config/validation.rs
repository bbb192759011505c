//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check cross-field requirements (auth enabled ⇒ users present)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
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

/// Validate a loaded configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }
    if config.listener.max_header_bytes < 1024 {
        errors.push(ValidationError::new(
            "listener.max_header_bytes",
            "must be at least 1024",
        ));
    }

    if config.transport.dial_timeout_secs == 0 {
        errors.push(ValidationError::new("transport.dial_timeout_secs", "must be > 0"));
    }
    if config.transport.idle_timeout_secs == 0 {
        errors.push(ValidationError::new("transport.idle_timeout_secs", "must be > 0"));
    }

    if config.tunnel.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("tunnel.connect_timeout_secs", "must be > 0"));
    }
    if config.tunnel.client_rw_timeout_secs == 0 {
        errors.push(ValidationError::new("tunnel.client_rw_timeout_secs", "must be > 0"));
    }
    if config.tunnel.target_rw_timeout_secs == 0 {
        errors.push(ValidationError::new("tunnel.target_rw_timeout_secs", "must be > 0"));
    }

    if let Some(parent) = &config.upstream.parent_proxy {
        match Url::parse(parent) {
            Ok(url) if url.scheme() == "http" && url.host_str().is_some() => {}
            Ok(_) => errors.push(ValidationError::new(
                "upstream.parent_proxy",
                "must be an http:// URL with a host",
            )),
            Err(e) => errors.push(ValidationError::new(
                "upstream.parent_proxy",
                format!("invalid URL: {e}"),
            )),
        }
    }
    if config.upstream.bypass.iter().any(|h| h.trim().is_empty()) {
        errors.push(ValidationError::new("upstream.bypass", "entries must not be empty"));
    }

    for client in &config.access.allowed_clients {
        if client.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::new(
                "access.allowed_clients",
                format!("'{client}' is not an IP address"),
            ));
        }
    }
    if config.access.allowed_connect_ports.contains(&0) {
        errors.push(ValidationError::new(
            "access.allowed_connect_ports",
            "port 0 is not a valid CONNECT target",
        ));
    }

    if config.auth.enabled {
        if config.auth.users.is_empty() {
            errors.push(ValidationError::new(
                "auth.users",
                "at least one user is required when auth is enabled",
            ));
        }
        for user in &config.auth.users {
            if user.username.is_empty() || user.username.contains(':') {
                errors.push(ValidationError::new(
                    "auth.users",
                    format!("invalid username '{}'", user.username),
                ));
            }
        }
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address when metrics are enabled",
        ));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                "must be a socket address when admin is enabled",
            ));
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
