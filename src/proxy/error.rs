//! Terminal request errors.
//!
//! Every variant is scoped to one request; none is retried and none takes the
//! process down. All are reported through `Delegate::error_log`.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// Boxed error used at the capability seams (transport, parent resolution).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The response sink cannot hand out the raw client stream.
    #[error("connection hijack unsupported: {0}")]
    HijackUnsupported(&'static str),

    /// The CONNECT request does not name a `host:port` target.
    #[error("invalid tunnel target: {0:?}")]
    InvalidTarget(String),

    /// The delegate failed to resolve a parent proxy.
    #[error("failed to resolve parent proxy for [{target}]: {source}")]
    ParentProxy {
        target: String,
        #[source]
        source: BoxError,
    },

    /// The resolved parent proxy URL has no usable address.
    #[error("parent proxy URL {0} has no host")]
    InvalidParent(String),

    /// Dialing the tunnel target (or parent) failed.
    #[error("tunnel connect to [{target}] via {addr} failed: {source}")]
    Dial {
        target: String,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Dialing the tunnel target (or parent) did not finish in time.
    #[error("tunnel connect to [{target}] via {addr} timed out after {timeout:?}")]
    DialTimeout {
        target: String,
        addr: String,
        timeout: Duration,
    },

    /// Telling the client (or parent) about the tunnel failed.
    #[error("tunnel handshake for [{target}] failed: {source}")]
    Handshake {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The round-trip capability failed for a plain HTTP request.
    #[error("HTTP request to [{url}] failed: {source}")]
    RoundTrip {
        url: String,
        #[source]
        source: BoxError,
    },

    /// Writing the response to the client failed midway.
    #[error("writing response for [{url}] failed: {source}")]
    WriteResponse {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// The default transport could not be built.
    #[error("transport setup failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ProxyError {
    /// Status written to the client for this error, when one can still be written.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            Self::HijackUnsupported(_)
            | Self::ParentProxy { .. }
            | Self::InvalidParent(_)
            | Self::Dial { .. }
            | Self::DialTimeout { .. }
            | Self::Handshake { .. }
            | Self::RoundTrip { .. }
            | Self::WriteResponse { .. }
            | Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HijackUnsupported(_) => "hijack",
            Self::InvalidTarget(_) => "invalid_target",
            Self::ParentProxy { .. } | Self::InvalidParent(_) => "parent_proxy",
            Self::Dial { .. } | Self::DialTimeout { .. } => "dial",
            Self::Handshake { .. } => "handshake",
            Self::RoundTrip { .. } => "round_trip",
            Self::WriteResponse { .. } => "write_response",
            Self::Transport(_) => "transport",
        }
    }
}
