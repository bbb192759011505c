//! CONNECT tunnel forwarding.
//!
//! # Responsibilities
//! - Take over the client stream and dial the target (or parent proxy)
//! - Perform the tunnel handshake on the correct side
//! - Relay bytes both ways until either side closes or a deadline passes
//!
//! # Design Decisions
//! - Tunnel traffic is opaque; headers are never inspected or rewritten
//! - Deadlines are absolute and cover the handshake and the whole relay
//! - Target→client runs on its own task; client→target runs on the caller's.
//!   Whichever finishes first ends the tunnel
//! - The parent proxy's reply to our CONNECT is relayed to the client as-is
//!
//! # Data Flow
//! ```text
//! before_tunnel_forward → hijack → parent_proxy → dial
//!     → "200 Connection established" to client   (direct)
//!     | "CONNECT host:port" to parent              (chained)
//!     → relay
//! ```

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use url::Url;

use crate::config::TunnelConfig;
use crate::observability::metrics;
use crate::proxy::context::{status_response, Context};
use crate::proxy::delegate::Delegate;
use crate::proxy::error::ProxyError;
use crate::proxy::http::ResponseStatus;
use crate::proxy::writer::{ClientStream, ResponseWriter};

/// Sent to the client once a direct tunnel is up.
pub const TUNNEL_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection established\r\n\r\n";

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Request line asking a parent proxy to open a tunnel to `target`.
pub fn tunnel_request_line(target: &str) -> String {
    format!("CONNECT {target} HTTP/1.1\r\n\r\n")
}

/// Forward a CONNECT request as a raw TCP tunnel.
pub(crate) async fn forward_tunnel<W: ResponseWriter>(
    delegate: &dyn Delegate,
    config: &TunnelConfig,
    ctx: &mut Context,
    rw: &mut W,
) {
    delegate.before_tunnel_forward(ctx);
    if ctx.is_aborted() {
        return;
    }

    let mut client = match rw.hijack() {
        Ok(stream) => stream,
        Err(err) => {
            delegate.error_log(&err);
            let status = err.status_code();
            ctx.data.insert(ResponseStatus(status));
            if let Err(e) = rw.write_response(status_response(status)).await {
                tracing::debug!(request_id = %ctx.id(), error = %e, "failed to write error response");
            }
            metrics::record_tunnel("failed");
            return;
        }
    };

    match establish(delegate, config, ctx, &mut client).await {
        Ok(Some(target)) => {
            ctx.data.insert(ResponseStatus(StatusCode::OK));
            metrics::record_tunnel("established");
            run_relay(ctx, client, target).await;
        }
        Ok(None) => {
            metrics::record_tunnel("failed");
        }
        Err(err) => {
            delegate.error_log(&err);
            let status = err.status_code();
            ctx.data.insert(ResponseStatus(status));
            metrics::record_tunnel("failed");
            // Nothing has been sent on the hijacked stream yet.
            if let Err(e) = write_status(&mut client, status).await {
                tracing::debug!(request_id = %ctx.id(), error = %e, "failed to write error response");
            }
            let _ = client.shutdown().await;
        }
    }
}

/// Resolve, dial and handshake. `Ok(None)` means the client handshake failed
/// and the client is gone; there is nothing left to answer.
async fn establish(
    delegate: &dyn Delegate,
    config: &TunnelConfig,
    ctx: &mut Context,
    client: &mut ClientStream,
) -> Result<Option<TunnelTarget>, ProxyError> {
    let target = tunnel_target(ctx)?;

    let parent = delegate
        .parent_proxy(&ctx.req)
        .map_err(|source| ProxyError::ParentProxy {
            target: target.clone(),
            source,
        })?;

    let dial_addr = match &parent {
        Some(url) => parent_addr(url)?,
        None => target.clone(),
    };

    tracing::debug!(
        request_id = %ctx.id(),
        target = %target,
        via = %dial_addr,
        chained = parent.is_some(),
        "opening tunnel"
    );

    let mut stream = dial(
        TcpStream::connect(dial_addr.as_str()),
        config.connect_timeout(),
        &target,
        &dial_addr,
    )
    .await?;
    let _ = stream.set_nodelay(true);

    let now = Instant::now();
    let deadlines = Deadlines {
        client: now + config.client_rw_timeout(),
        target: now + config.target_rw_timeout(),
    };

    if parent.is_none() {
        if let Err(source) = write_before(deadlines.client, client, TUNNEL_ESTABLISHED).await {
            delegate.error_log(&ProxyError::Handshake { target, source });
            return Ok(None);
        }
    } else {
        let line = tunnel_request_line(&target);
        write_before(deadlines.target, &mut stream, line.as_bytes())
            .await
            .map_err(|source| ProxyError::Handshake {
                target: target.clone(),
                source,
            })?;
    }

    Ok(Some(TunnelTarget {
        stream,
        target,
        deadlines,
    }))
}

/// Await `connect`, giving up after `limit`.
async fn dial<S, F>(connect: F, limit: Duration, target: &str, addr: &str) -> Result<S, ProxyError>
where
    F: Future<Output = io::Result<S>>,
{
    match timeout(limit, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(ProxyError::Dial {
            target: target.to_string(),
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(ProxyError::DialTimeout {
            target: target.to_string(),
            addr: addr.to_string(),
            timeout: limit,
        }),
    }
}

struct TunnelTarget {
    stream: TcpStream,
    target: String,
    deadlines: Deadlines,
}

#[derive(Debug, Clone, Copy)]
struct Deadlines {
    client: Instant,
    target: Instant,
}

impl Deadlines {
    fn relay(&self) -> Instant {
        self.client.min(self.target)
    }
}

async fn run_relay(ctx: &mut Context, client: ClientStream, target: TunnelTarget) {
    let TunnelTarget {
        stream,
        target,
        deadlines,
    } = target;
    let stats = RelayStats::default();

    match timeout_at(deadlines.relay(), relay(client, stream, stats.clone())).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(request_id = %ctx.id(), target = %target, error = %e, "tunnel relay ended with error");
        }
        Err(_) => {
            tracing::debug!(request_id = %ctx.id(), target = %target, "tunnel deadline reached");
        }
    }

    let (sent, received) = stats.totals();
    metrics::record_tunnel_bytes(sent, received);
    tracing::debug!(
        request_id = %ctx.id(),
        target = %target,
        bytes_to_target = sent,
        bytes_to_client = received,
        "tunnel closed"
    );
}

/// Byte counters for both relay directions.
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    to_target: Arc<AtomicU64>,
    to_client: Arc<AtomicU64>,
}

impl RelayStats {
    /// `(client → target, target → client)` byte totals so far.
    pub fn totals(&self) -> (u64, u64) {
        (
            self.to_target.load(Ordering::Relaxed),
            self.to_client.load(Ordering::Relaxed),
        )
    }
}

/// Copy bytes both ways until either direction reaches EOF or fails, then
/// close both streams.
pub async fn relay<C, T>(client: C, target: T, stats: RelayStats) -> io::Result<()>
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (target_read, target_write) = tokio::io::split(target);

    let to_client = stats.to_client.clone();
    let mut downstream = AbortOnDrop(tokio::spawn(async move {
        pipe(target_read, client_write, &to_client).await
    }));
    let upstream = pipe(client_read, target_write, &stats.to_target);

    let result = tokio::select! {
        result = upstream => result,
        joined = &mut downstream.0 => {
            return joined.unwrap_or_else(|e| Err(io::Error::other(e)));
        }
    };

    // Client side finished first; stop the other half and wait until it has
    // released its stream halves.
    downstream.0.abort();
    let _ = (&mut downstream.0).await;
    result
}

async fn pipe<R, W>(mut reader: R, mut writer: W, counter: &AtomicU64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
    writer.shutdown().await
}

/// Aborts the task when dropped so a finished tunnel never leaks its other half.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// `host:port` named by the CONNECT request.
fn tunnel_target(ctx: &Context) -> Result<String, ProxyError> {
    match ctx.req.uri().authority() {
        Some(authority) if authority.port_u16().is_some() => Ok(authority.as_str().to_string()),
        _ => Err(ProxyError::InvalidTarget(ctx.req.uri().to_string())),
    }
}

fn parent_addr(url: &Url) -> Result<String, ProxyError> {
    let host = url
        .host_str()
        .ok_or_else(|| ProxyError::InvalidParent(url.to_string()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ProxyError::InvalidParent(url.to_string()))?;
    Ok(format!("{host}:{port}"))
}

async fn write_before<S>(deadline: Instant, stream: &mut S, bytes: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    let write = async {
        stream.write_all(bytes).await?;
        stream.flush().await
    };
    timeout_at(deadline, write)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write deadline exceeded"))?
}

async fn write_status<S>(stream: &mut S, status: StatusCode) -> io::Result<()>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    stream.write_all(head.as_bytes()).await?;
    stream.flush().await
}
