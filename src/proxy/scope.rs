//! Request lifetime.
//!
//! A request is live from the first hook until the last byte of its response
//! has been handed to the client, or the response was dropped.
//! `RequestScope` owns the context for that whole span; dropping it runs
//! `finish` and only then releases the connection slot.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use bytes::Bytes;
use http::Response;
use http_body::{Body as HttpBody, Frame, SizeHint};

use crate::net::connection::ConnectionGuard;
use crate::proxy::context::Context;
use crate::proxy::delegate::Delegate;
use crate::proxy::Body;

/// Everything that must stay alive while a request is in flight.
pub struct RequestScope {
    // Field order is drop order: finish runs before the slot is released.
    finish: FinishGuard,
    _slot: ConnectionGuard,
}

impl RequestScope {
    pub(crate) fn new(slot: ConnectionGuard, delegate: Arc<dyn Delegate>, ctx: Context) -> Self {
        Self {
            finish: FinishGuard { delegate, ctx },
            _slot: slot,
        }
    }

    pub(crate) fn ctx(&mut self) -> &mut Context {
        &mut self.finish.ctx
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("request_id", &self.finish.ctx.id())
            .finish_non_exhaustive()
    }
}

/// Runs `finish` exactly once, unwinding and cancellation included.
struct FinishGuard {
    delegate: Arc<dyn Delegate>,
    ctx: Context,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.delegate.finish(&mut self.ctx);
    }
}

/// Tie `scope` to the response body: it is dropped once the body reports
/// EOF or an error, or when the body itself is dropped.
pub fn release_at_eof(response: Response<Body>, scope: RequestScope) -> Response<Body> {
    response.map(|inner| {
        Body::new(ScopedBody {
            inner,
            scope: Some(scope),
        })
    })
}

struct ScopedBody {
    inner: Body,
    scope: Option<RequestScope>,
}

impl HttpBody for ScopedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if matches!(polled, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            this.scope.take();
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
