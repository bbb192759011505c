//! Per-request state shared by the pipeline stages.

use std::net::SocketAddr;
use std::time::Instant;

use http::{Extensions, Request, Response, StatusCode};
use uuid::Uuid;

use crate::proxy::Body;

/// Address of the client that opened the connection.
///
/// The front end stores it in the request extensions; the dispatcher copies it
/// into the [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// State for one client request, owned by the dispatcher for the request's
/// lifetime and dropped when handling completes.
#[derive(Debug)]
pub struct Context {
    id: Uuid,
    client_addr: Option<SocketAddr>,
    started_at: Instant,
    /// The inbound request. Hooks may mutate it before it is forwarded.
    pub req: Request<Body>,
    /// Open-ended typed data stages pass to later stages.
    pub data: Extensions,
    aborted: bool,
    response: Option<Response<Body>>,
}

impl Context {
    /// Build a fresh context around an inbound request.
    pub fn new(req: Request<Body>) -> Self {
        let client_addr = req.extensions().get::<ClientAddr>().map(|addr| addr.0);
        Self {
            id: Uuid::new_v4(),
            client_addr,
            started_at: Instant::now(),
            req,
            data: Extensions::new(),
            aborted: false,
            response: None,
        }
    }

    /// Unique ID of this request, used in every log line.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Stop processing this request. Only `finish` runs afterwards.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Abort and have the dispatcher write `response` to the client.
    pub fn respond(&mut self, response: Response<Body>) {
        self.response = Some(response);
        self.aborted = true;
    }

    /// Abort with an empty-bodied response carrying `status`.
    pub fn respond_status(&mut self, status: StatusCode) {
        self.respond(status_response(status));
    }

    /// Whether a hook staged a response that has not been written yet.
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub(crate) fn take_response(&mut self) -> Option<Response<Body>> {
        self.response.take()
    }
}

/// Empty-bodied response with `status`.
pub fn status_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request<Body> {
        Request::builder()
            .uri("http://example.com/")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn picks_up_client_addr_from_extensions() {
        let addr: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        let mut req = request();
        req.extensions_mut().insert(ClientAddr(addr));

        let ctx = Context::new(req);
        assert_eq!(ctx.client_addr(), Some(addr));
        assert!(!ctx.is_aborted());
    }

    #[test]
    fn respond_stages_response_and_aborts() {
        let mut ctx = Context::new(request());
        ctx.respond_status(StatusCode::FORBIDDEN);

        assert!(ctx.is_aborted());
        assert!(ctx.has_response());
        let response = ctx.take_response().unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(!ctx.has_response());
        assert!(ctx.is_aborted());
    }

    #[test]
    fn data_bag_is_typed() {
        #[derive(Clone, Debug, PartialEq)]
        struct User(&'static str);

        let mut ctx = Context::new(request());
        ctx.data.insert(User("alice"));
        assert_eq!(ctx.data.get::<User>(), Some(&User("alice")));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(Context::new(request()).id(), Context::new(request()).id());
    }
}
