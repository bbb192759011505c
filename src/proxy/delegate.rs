//! Interception hooks.
//!
//! # Responsibilities
//! - Define the extension points the dispatcher invokes at fixed stages
//! - Provide a permissive no-op default for every hook
//!
//! # Design Decisions
//! - One trait, every method defaulted; implementors override only what they need
//! - Hooks are synchronous and get `&mut Context`; a hook stops the request by
//!   calling `Context::abort` or `Context::respond`
//! - One delegate instance is shared by every in-flight request, hence `Send + Sync`

use http::{Request, Response};
use url::Url;

use crate::proxy::context::Context;
use crate::proxy::error::{BoxError, ProxyError};
use crate::proxy::Body;

/// Hook set bound to a [`Proxy`](crate::proxy::Proxy).
///
/// Stage order per request: `connect`, `auth`, then either
/// `before_request` → round trip → `before_response` for plain HTTP or
/// `before_tunnel_forward` for CONNECT, and finally `finish`.
pub trait Delegate: Send + Sync {
    /// First stage. Accept or reject the client connection.
    fn connect(&self, _ctx: &mut Context) {}

    /// Authenticate or authorize the request.
    fn auth(&self, _ctx: &mut Context) {}

    /// Inspect or mutate the request before it is sent upstream.
    fn before_request(&self, _ctx: &mut Context) {}

    /// Inspect or replace the upstream response, or the round-trip error.
    fn before_response(
        &self,
        _ctx: &mut Context,
        _result: &mut Result<Response<Body>, BoxError>,
    ) {
    }

    /// Accept or reject a CONNECT tunnel.
    fn before_tunnel_forward(&self, _ctx: &mut Context) {}

    /// Pick a parent proxy for this request, or `None` to go direct.
    ///
    /// Consulted for tunnels and before each plain HTTP round trip.
    fn parent_proxy(&self, _req: &Request<Body>) -> Result<Option<Url>, BoxError> {
        Ok(None)
    }

    /// Report a terminal request error.
    fn error_log(&self, err: &ProxyError) {
        tracing::error!(error = %err, "proxy error");
    }

    /// Last stage. Runs exactly once per request, aborted or not.
    fn finish(&self, _ctx: &mut Context) {}
}

/// Delegate that allows everything and never chains through a parent.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDelegate;

impl Delegate for DefaultDelegate {}
