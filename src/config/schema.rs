//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limits).
    pub listener: ListenerConfig,

    /// Upstream HTTP client settings used for non-CONNECT requests.
    pub transport: TransportConfig,

    /// CONNECT tunnel timing.
    pub tunnel: TunnelConfig,

    /// Parent proxy chaining.
    pub upstream: UpstreamConfig,

    /// Client and CONNECT target restrictions.
    pub access: AccessConfig,

    /// Proxy authentication.
    pub auth: AuthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin endpoint settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,

    /// Upper bound on the first request head read off a new connection.
    pub max_header_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            max_connections: 10_000,
            max_header_bytes: 64 * 1024,
        }
    }
}

/// Upstream HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Close every upstream connection after one use.
    pub disable_keep_alive: bool,

    /// Upstream dial timeout in seconds.
    pub dial_timeout_secs: u64,

    /// TCP keep-alive interval in seconds.
    pub tcp_keepalive_secs: u64,

    /// Maximum idle pooled connections per upstream host.
    pub max_idle_per_host: usize,

    /// Idle pooled connection lifetime in seconds.
    pub idle_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            disable_keep_alive: false,
            dial_timeout_secs: 30,
            tcp_keepalive_secs: 30,
            max_idle_per_host: 100,
            idle_timeout_secs: 90,
        }
    }
}

impl TransportConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn tcp_keepalive(&self) -> Duration {
        Duration::from_secs(self.tcp_keepalive_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// CONNECT tunnel timeouts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Dial timeout for the tunnel target (or parent proxy), in seconds.
    pub connect_timeout_secs: u64,

    /// Deadline for all client-side I/O once the tunnel is dialed, in seconds.
    pub client_rw_timeout_secs: u64,

    /// Deadline for all target-side I/O once the tunnel is dialed, in seconds.
    pub target_rw_timeout_secs: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            client_rw_timeout_secs: 60,
            target_rw_timeout_secs: 60,
        }
    }
}

impl TunnelConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn client_rw_timeout(&self) -> Duration {
        Duration::from_secs(self.client_rw_timeout_secs)
    }

    pub fn target_rw_timeout(&self) -> Duration {
        Duration::from_secs(self.target_rw_timeout_secs)
    }
}

/// Parent proxy chaining.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Parent proxy URL (e.g., "http://10.0.0.1:3128"). None = connect directly.
    pub parent_proxy: Option<String>,

    /// Hosts reached directly even when a parent is configured.
    /// Entries starting with '.' match any subdomain.
    pub bypass: Vec<String>,
}

/// Access restrictions.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AccessConfig {
    /// Client IPs allowed to use the proxy. Empty = everyone.
    pub allowed_clients: Vec<String>,

    /// Ports CONNECT may target. Empty = any port.
    pub allowed_connect_ports: Vec<u16>,
}

/// Basic proxy authentication.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require `Proxy-Authorization`.
    pub enabled: bool,

    /// Realm advertised in `Proxy-Authenticate`.
    pub realm: String,

    /// Accepted credentials.
    pub users: Vec<UserConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            realm: "forward-proxy".to_string(),
            users: Vec::new(),
        }
    }
}

/// One accepted username/password pair.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin endpoint.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin endpoint bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
