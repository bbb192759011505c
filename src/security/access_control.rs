//! Client and CONNECT target restrictions.
//!
//! # Design Decisions
//! - Empty lists mean "allow all", matching a permissive default delegate
//! - Unknown client addresses are rejected when an allow-list exists

use std::net::{IpAddr, SocketAddr};

use crate::config::AccessConfig;

/// Access restrictions checked by the policy delegate.
#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    allowed_clients: Vec<IpAddr>,
    allowed_connect_ports: Vec<u16>,
}

impl AccessControl {
    /// Build from config. Entries that are not IP addresses are skipped;
    /// validation reports them before this point.
    pub fn from_config(config: &AccessConfig) -> Self {
        Self {
            allowed_clients: config
                .allowed_clients
                .iter()
                .filter_map(|ip| ip.parse().ok())
                .collect(),
            allowed_connect_ports: config.allowed_connect_ports.clone(),
        }
    }

    pub fn client_allowed(&self, client: Option<SocketAddr>) -> bool {
        if self.allowed_clients.is_empty() {
            return true;
        }
        let Some(client) = client else {
            return false;
        };
        let ip = match client.ip() {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
            v4 => v4,
        };
        self.allowed_clients.contains(&ip)
    }

    pub fn connect_port_allowed(&self, port: Option<u16>) -> bool {
        if self.allowed_connect_ports.is_empty() {
            return true;
        }
        port.is_some_and(|p| self.allowed_connect_ports.contains(&p))
    }
}
