//! Client-facing proxy server.
//!
//! # Responsibilities
//! - Accept connections through the bounded listener
//! - Read the first request head and pick a serving path
//! - Serve CONNECT on the raw socket so it can be hijacked for a tunnel
//! - Serve everything else through hyper's HTTP/1 driver (keep-alive, pipelining)
//! - Stop accepting on shutdown and drain in-flight connections
//!
//! # Design Decisions
//! - hyper cannot hand out a socket before it has written its own response,
//!   while a tunnel must write the raw success line itself. The first head is
//!   therefore parsed here and only non-CONNECT connections go to hyper
//! - Bytes read while peeking are replayed with `Rewind` so nothing is lost

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use http::{Method, Request};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::config::ListenerConfig;
use crate::http::request::{read_head, HeadError, RequestHead};
use crate::http::response::{encode_head, HyperResponseWriter, RawResponseWriter};
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::net::rewind::Rewind;
use crate::proxy::{Body, ClientAddr, Proxy};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Serves proxy clients on a bound listener.
pub struct ProxyServer {
    proxy: Arc<Proxy>,
    max_header_bytes: usize,
    drain_timeout: Duration,
}

impl ProxyServer {
    pub fn new(proxy: Arc<Proxy>, config: &ListenerConfig) -> Self {
        Self {
            proxy,
            max_header_bytes: config.max_header_bytes,
            drain_timeout: DRAIN_TIMEOUT,
        }
    }

    /// How long to wait for in-flight connections after shutdown.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn proxy(&self) -> &Arc<Proxy> {
        &self.proxy
    }

    /// Accept and serve until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(address = %addr, "Proxy server starting");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let proxy = self.proxy.clone();
                        let max_header_bytes = self.max_header_bytes;
                        tokio::spawn(serve_connection(proxy, stream, peer, permit, max_header_bytes));
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                    }
                    Err(e) => return Err(e),
                },
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            }
        }

        if tokio::time::timeout(self.drain_timeout, listener.drained())
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = listener.max_connections() - listener.available_permits(),
                "Drain timeout reached, dropping remaining connections"
            );
        }

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

async fn serve_connection(
    proxy: Arc<Proxy>,
    mut stream: TcpStream,
    peer: SocketAddr,
    permit: ConnectionPermit,
    max_header_bytes: usize,
) {
    let _permit = permit;
    let _ = stream.set_nodelay(true);

    let (head, buf) = match read_head(&mut stream, max_header_bytes).await {
        Ok(Some(peeked)) => peeked,
        Ok(None) => return,
        Err(e) => {
            reject(&mut stream, peer, e).await;
            return;
        }
    };

    if head.method == Method::CONNECT {
        serve_tunnel(&proxy, stream, peer, head, buf).await;
    } else {
        serve_http(proxy, stream, peer, buf).await;
    }
}

async fn serve_tunnel(
    proxy: &Proxy,
    stream: TcpStream,
    peer: SocketAddr,
    head: RequestHead,
    mut buf: BytesMut,
) {
    // Bytes after the head belong to the tunnel payload.
    let leftover = buf.split_off(head.len).freeze();
    let mut req = head.into_request();
    req.extensions_mut().insert(ClientAddr(peer));

    let mut rw = RawResponseWriter::new(Rewind::new(stream, leftover));
    proxy.handle(&mut rw, req).await;
    if let Err(e) = rw.finish().await {
        tracing::debug!(peer = %peer, error = %e, "Closing client connection failed");
    }
}

async fn serve_http(proxy: Arc<Proxy>, stream: TcpStream, peer: SocketAddr, buf: BytesMut) {
    let io = TokioIo::new(Rewind::new(stream, buf.freeze()));
    let service = service_fn(move |req: Request<Incoming>| {
        let proxy = proxy.clone();
        async move {
            let mut req = req.map(Body::new);
            req.extensions_mut().insert(ClientAddr(peer));
            let mut rw = HyperResponseWriter::default();
            proxy.handle(&mut rw, req).await;
            Ok::<_, Infallible>(rw.into_response())
        }
    });

    if let Err(e) = http1::Builder::new()
        .title_case_headers(true)
        .serve_connection(io, service)
        .await
    {
        tracing::debug!(peer = %peer, error = %e, "Client connection error");
    }
}

async fn reject(stream: &mut TcpStream, peer: SocketAddr, err: HeadError) {
    tracing::debug!(peer = %peer, error = %err, "Rejecting unreadable request head");
    if let Some(status) = err.status_code() {
        let head = encode_head(status, &http::HeaderMap::new(), Some(0));
        let _ = stream.write_all(&head).await;
        let _ = stream.shutdown().await;
    }
}
