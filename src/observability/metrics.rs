//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): finished requests by method, kind, status
//! - `proxy_request_duration_seconds` (histogram): dispatcher latency
//! - `proxy_client_connections` (gauge): live client connections
//! - `proxy_tunnels_total` (counter): tunnel outcomes
//! - `proxy_tunnel_bytes_total` (counter): relayed bytes by direction
//! - `proxy_errors_total` (counter): terminal errors by kind
//!
//! Without an installed recorder every call here is a no-op, so library users
//! and tests pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished request.
pub fn record_request(method: &str, kind: &'static str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "kind" => kind,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

/// Publish the live client-connection count.
pub fn set_client_connections(count: u64) {
    gauge!("proxy_client_connections").set(count as f64);
}

/// Record how a tunnel ended.
pub fn record_tunnel(outcome: &'static str) {
    counter!("proxy_tunnels_total", "outcome" => outcome).increment(1);
}

/// Record relayed tunnel bytes.
pub fn record_tunnel_bytes(client_to_target: u64, target_to_client: u64) {
    counter!("proxy_tunnel_bytes_total", "direction" => "client_to_target")
        .increment(client_to_target);
    counter!("proxy_tunnel_bytes_total", "direction" => "target_to_client")
        .increment(target_to_client);
}

/// Record a terminal error.
pub fn record_error(kind: &'static str) {
    counter!("proxy_errors_total", "kind" => kind).increment(1);
}
