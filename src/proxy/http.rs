//! Plain HTTP forwarding.
//!
//! # Data Flow
//! ```text
//! before_request → strip hop headers → parent_proxy → round trip (skipped if
//!     the parent lookup failed)
//!     → before_response → strip hop headers → write response
//! ```

use http::{Request, StatusCode};

use crate::proxy::context::{status_response, Context};
use crate::proxy::delegate::Delegate;
use crate::proxy::error::{BoxError, ProxyError};
use crate::proxy::transport::RoundTrip;
use crate::proxy::writer::ResponseWriter;
use crate::proxy::Body;
use crate::security::headers::remove_hop_headers;

/// Forward a non-CONNECT request and write exactly one response.
pub(crate) async fn forward_http<W: ResponseWriter>(
    delegate: &dyn Delegate,
    transport: &dyn RoundTrip,
    ctx: &mut Context,
    rw: &mut W,
) {
    delegate.before_request(ctx);
    if ctx.is_aborted() {
        return;
    }

    remove_hop_headers(ctx.req.headers_mut());
    let outbound = take_outbound(&mut ctx.req);
    let url = outbound.uri().to_string();

    // A failed parent lookup is reported like any other round-trip failure,
    // so `before_response` still sees it.
    let parent = delegate.parent_proxy(&outbound);
    let mut result = match parent {
        Ok(parent) => {
            tracing::debug!(
                request_id = %ctx.id(),
                method = %outbound.method(),
                uri = %url,
                parent = parent.as_ref().map(|p| p.as_str()),
                "forwarding request"
            );
            transport.round_trip(outbound, parent).await
        }
        Err(source) => Err(Box::new(ProxyError::ParentProxy {
            target: url.clone(),
            source,
        }) as BoxError),
    };

    delegate.before_response(ctx, &mut result);
    if ctx.is_aborted() {
        return;
    }

    let mut response = match result {
        Ok(response) => response,
        Err(source) => {
            let err = match source.downcast::<ProxyError>() {
                Ok(err) => *err,
                Err(source) => ProxyError::RoundTrip { url, source },
            };
            fail(delegate, ctx, rw, err).await;
            return;
        }
    };

    remove_hop_headers(response.headers_mut());
    ctx.data.insert(ResponseStatus(response.status()));

    // The body is dropped on every exit path of `write_response`.
    if let Err(source) = rw.write_response(response).await {
        delegate.error_log(&ProxyError::WriteResponse { url, source });
    }
}

/// Status of the response handed to the client, recorded for `finish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseStatus(pub StatusCode);

/// Copy the request head and move the body out, leaving `req` with an empty body
/// so later hooks can still inspect what was sent.
fn take_outbound(req: &mut Request<Body>) -> Request<Body> {
    let body = std::mem::replace(req.body_mut(), Body::empty());
    let mut outbound = Request::new(body);
    *outbound.method_mut() = req.method().clone();
    *outbound.uri_mut() = req.uri().clone();
    *outbound.version_mut() = req.version();
    *outbound.headers_mut() = req.headers().clone();
    outbound
}

async fn fail<W: ResponseWriter>(
    delegate: &dyn Delegate,
    ctx: &mut Context,
    rw: &mut W,
    err: ProxyError,
) {
    delegate.error_log(&err);
    let status = err.status_code();
    ctx.data.insert(ResponseStatus(status));
    if let Err(e) = rw.write_response(status_response(status)).await {
        tracing::debug!(request_id = %ctx.id(), error = %e, "failed to write error response");
    }
}
