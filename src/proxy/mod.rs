//! Request dispatch and forwarding engine.
//!
//! # Responsibilities
//! - Run every request through the fixed hook pipeline
//! - Route CONNECT to the tunnel forwarder and everything else to the HTTP forwarder
//! - Track the number of in-flight client requests
//!
//! # Design Decisions
//! - One `Proxy` per process, shared behind `Arc`; it is immutable after
//!   construction apart from the connection counter
//! - `finish` runs from a drop guard (`scope::RequestScope`) so it fires exactly
//!   once on every exit path, panics and cancellation included
//! - The scope is handed to the response writer, so a streamed response keeps
//!   the request counted until its body ends
//! - Increment happens before any hook, decrement after `finish`
//!
//! # Data Flow
//! ```text
//! handle(rw, req)
//!     → connect → auth
//!     → CONNECT ? forward_tunnel : forward_http
//!     → finish (always, once the response body is done)
//! ```

pub mod context;
pub mod delegate;
pub mod error;
pub mod http;
pub mod scope;
pub mod transport;
pub mod tunnel;
pub mod writer;

use std::sync::Arc;

use ::http::{Method, Request};

use crate::config::TunnelConfig;
use crate::net::connection::ConnectionTracker;

pub use context::{ClientAddr, Context};
pub use delegate::{DefaultDelegate, Delegate};
pub use error::{BoxError, ProxyError};
pub use scope::RequestScope;
pub use transport::{HttpTransport, RoundTrip, TransportSettings};
pub use writer::{ClientStream, ResponseWriter};

/// Body type used for requests and responses throughout the proxy.
pub type Body = axum::body::Body;

/// Forward proxy core.
pub struct Proxy {
    delegate: Arc<dyn Delegate>,
    transport: Arc<dyn RoundTrip>,
    tunnel: TunnelConfig,
    connections: ConnectionTracker,
}

impl Proxy {
    pub fn builder() -> ProxyBuilder {
        ProxyBuilder::default()
    }

    /// Handle one client request end to end, writing at most one response to `rw`
    /// (or taking over its stream for a tunnel).
    ///
    /// The request stays counted, and `finish` is deferred, until `rw` has
    /// finished sending what was written to it.
    pub async fn handle<W: ResponseWriter>(&self, rw: &mut W, req: Request<Body>) {
        let mut scope = RequestScope::new(
            self.connections.track(),
            self.delegate.clone(),
            Context::new(req),
        );
        self.dispatch(scope.ctx(), rw).await;
        rw.release_after_send(scope);
    }

    async fn dispatch<W: ResponseWriter>(&self, ctx: &mut Context, rw: &mut W) {
        tracing::trace!(
            request_id = %ctx.id(),
            method = %ctx.req.method(),
            uri = %ctx.req.uri(),
            client = ?ctx.client_addr(),
            "dispatching request"
        );

        self.delegate.connect(ctx);
        if ctx.is_aborted() {
            write_staged(ctx, rw).await;
            return;
        }

        self.delegate.auth(ctx);
        if ctx.is_aborted() {
            write_staged(ctx, rw).await;
            return;
        }

        if ctx.req.method() == Method::CONNECT {
            tunnel::forward_tunnel(self.delegate.as_ref(), &self.tunnel, ctx, rw).await;
        } else {
            http::forward_http(self.delegate.as_ref(), self.transport.as_ref(), ctx, rw).await;
        }

        if ctx.is_aborted() {
            write_staged(ctx, rw).await;
        }
    }

    /// Number of client requests currently being handled.
    pub fn client_conn_num(&self) -> u64 {
        self.connections.active_count()
    }

    pub fn connection_tracker(&self) -> &ConnectionTracker {
        &self.connections
    }

    pub fn tunnel_config(&self) -> &TunnelConfig {
        &self.tunnel
    }
}

/// Builder for [`Proxy`].
#[derive(Default)]
pub struct ProxyBuilder {
    disable_keep_alive: bool,
    delegate: Option<Arc<dyn Delegate>>,
    transport: Option<Arc<dyn RoundTrip>>,
    settings: TransportSettings,
    tunnel: TunnelConfig,
}

impl ProxyBuilder {
    /// Close every upstream connection after one request.
    ///
    /// Only applies to the built-in transport; an explicit transport is used as given.
    pub fn disable_keep_alive(mut self, disable: bool) -> Self {
        self.disable_keep_alive = disable;
        self
    }

    pub fn delegate(mut self, delegate: Arc<dyn Delegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Replace the built-in round-trip implementation.
    pub fn transport(mut self, transport: Arc<dyn RoundTrip>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Pool and timeout settings for the built-in transport.
    pub fn transport_settings(mut self, settings: TransportSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn tunnel(mut self, tunnel: TunnelConfig) -> Self {
        self.tunnel = tunnel;
        self
    }

    pub fn build(self) -> Result<Proxy, ProxyError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let settings = if self.disable_keep_alive {
                    self.settings.without_keep_alive()
                } else {
                    self.settings
                };
                Arc::new(HttpTransport::new(settings)?) as Arc<dyn RoundTrip>
            }
        };

        Ok(Proxy {
            delegate: self
                .delegate
                .unwrap_or_else(|| Arc::new(DefaultDelegate)),
            transport,
            tunnel: self.tunnel,
            connections: ConnectionTracker::new(),
        })
    }
}

async fn write_staged<W: ResponseWriter>(ctx: &mut Context, rw: &mut W) {
    let Some(response) = ctx.take_response() else {
        return;
    };
    ctx.data.insert(http::ResponseStatus(response.status()));
    if let Err(e) = rw.write_response(response).await {
        tracing::debug!(request_id = %ctx.id(), error = %e, "failed to write staged response");
    }
}
