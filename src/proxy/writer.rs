//! Response sink abstraction.
//!
//! The dispatcher writes exactly one response per request through a
//! [`ResponseWriter`]. Tunnels instead take over the raw client stream with
//! [`ResponseWriter::hijack`], which only sinks backed by a plain socket support.

use std::future::Future;
use std::io;

use http::Response;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::proxy::error::ProxyError;
use crate::proxy::scope::RequestScope;
use crate::proxy::Body;

/// A raw bidirectional byte stream.
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> RawStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Client stream handed out by a successful hijack.
pub type ClientStream = Box<dyn RawStream>;

pub trait ResponseWriter: Send {
    /// Write status and headers, then stream the body to EOF.
    fn write_response(
        &mut self,
        response: Response<Body>,
    ) -> impl Future<Output = io::Result<()>> + Send;

    /// Take over the underlying connection. After a successful hijack the
    /// writer is spent and the caller owns the stream.
    fn hijack(&mut self) -> Result<ClientStream, ProxyError>;

    /// Keep `scope` alive until the written response has been fully sent.
    /// Writers that finish sending inside `write_response` drop it at once.
    fn release_after_send(&mut self, scope: RequestScope) {
        drop(scope);
    }
}
