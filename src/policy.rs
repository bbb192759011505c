//! Config-driven delegate used by the `forward-proxy` binary.
//!
//! # Responsibilities
//! - Connect: client IP allow-list (403)
//! - Auth: Basic proxy credentials (407 with challenge)
//! - BeforeTunnelForward: CONNECT port allow-list (403)
//! - ParentProxy: static parent with host bypass list
//! - ErrorLog / Finish: structured logs and metrics
//!
//! # Design Decisions
//! - Every check is built once from validated config; hooks never allocate
//!   beyond the response they stage
//! - Rejections are staged responses; the dispatcher writes them

use http::{Request, StatusCode};
use url::Url;

use crate::config::ProxyConfig;
use crate::observability::metrics;
use crate::proxy::http::ResponseStatus;
use crate::proxy::{BoxError, Body, Context, Delegate, ProxyError};
use crate::routing::{ParentConfigError, ParentRouter};
use crate::security::{AccessControl, AuthenticatedUser, ProxyAuth};

pub struct PolicyDelegate {
    access: AccessControl,
    auth: Option<ProxyAuth>,
    parents: ParentRouter,
}

impl PolicyDelegate {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ParentConfigError> {
        Ok(Self {
            access: AccessControl::from_config(&config.access),
            auth: config
                .auth
                .enabled
                .then(|| ProxyAuth::from_config(&config.auth)),
            parents: ParentRouter::from_config(&config.upstream)?,
        })
    }
}

impl Delegate for PolicyDelegate {
    fn connect(&self, ctx: &mut Context) {
        if !self.access.client_allowed(ctx.client_addr()) {
            tracing::warn!(
                request_id = %ctx.id(),
                client = ?ctx.client_addr(),
                "Client not in allow-list"
            );
            ctx.respond_status(StatusCode::FORBIDDEN);
        }
    }

    fn auth(&self, ctx: &mut Context) {
        let Some(auth) = &self.auth else {
            return;
        };
        match auth.verify(ctx.req.headers()) {
            Some(user) => {
                ctx.data.insert(AuthenticatedUser(user));
            }
            None => {
                tracing::debug!(request_id = %ctx.id(), "Proxy authentication failed");
                ctx.respond(auth.challenge());
            }
        }
    }

    fn before_tunnel_forward(&self, ctx: &mut Context) {
        let port = ctx.req.uri().port_u16();
        if !self.access.connect_port_allowed(port) {
            tracing::warn!(
                request_id = %ctx.id(),
                target = %ctx.req.uri(),
                "CONNECT port not allowed"
            );
            ctx.respond_status(StatusCode::FORBIDDEN);
        }
    }

    fn parent_proxy(&self, req: &Request<Body>) -> Result<Option<Url>, BoxError> {
        Ok(self.parents.resolve(req))
    }

    fn error_log(&self, err: &ProxyError) {
        metrics::record_error(err.kind());
        tracing::error!(error = %err, kind = err.kind(), "Proxy request failed");
    }

    fn finish(&self, ctx: &mut Context) {
        let kind = if ctx.req.method() == http::Method::CONNECT {
            "tunnel"
        } else {
            "http"
        };
        let status = ctx
            .data
            .get::<ResponseStatus>()
            .map(|s| s.0)
            .unwrap_or(StatusCode::OK);
        let user = ctx.data.get::<AuthenticatedUser>().map(|u| u.0.as_str());

        metrics::record_request(ctx.req.method().as_str(), kind, status.as_u16(), ctx.started_at());
        tracing::info!(
            request_id = %ctx.id(),
            client = ?ctx.client_addr(),
            user,
            method = %ctx.req.method(),
            uri = %ctx.req.uri(),
            kind,
            status = status.as_u16(),
            aborted = ctx.is_aborted(),
            elapsed_ms = ctx.started_at().elapsed().as_millis() as u64,
            "Request finished"
        );
    }
}
