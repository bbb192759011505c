//! CONNECT tunnels through a running proxy, driven over raw TCP.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forward_proxy::config::ProxyConfig;
use forward_proxy::proxy::tunnel::TUNNEL_ESTABLISHED;
use forward_proxy::proxy::{Body, BoxError, ProxyError};
use forward_proxy::{Delegate, Proxy};
use http::Request;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

mod common;

async fn connect_request(proxy: &common::TestProxy, target: &str) -> TcpStream {
    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    let head = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    client.write_all(head.as_bytes()).await.unwrap();
    client
}

async fn read_exact_within(client: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    buf
}

#[tokio::test]
async fn direct_tunnel_relays_both_ways() {
    let echo = common::start_echo_server().await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let mut client = connect_request(&proxy, &echo.to_string()).await;
    let head = common::read_head(&mut client).await;
    assert_eq!(head, TUNNEL_ESTABLISHED);
    assert_eq!(proxy.proxy.client_conn_num(), 1);

    client.write_all(b"ping over tunnel").await.unwrap();
    assert_eq!(read_exact_within(&mut client, 16).await, b"ping over tunnel");

    drop(client);
    proxy.wait_idle().await;
}

#[tokio::test]
async fn bytes_sent_with_the_head_are_relayed() {
    let echo = common::start_echo_server().await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT {echo} HTTP/1.1\r\nHost: {echo}\r\n\r\nearly");
    client.write_all(request.as_bytes()).await.unwrap();

    let head = common::read_head(&mut client).await;
    assert_eq!(head, TUNNEL_ESTABLISHED);
    assert_eq!(read_exact_within(&mut client, 5).await, b"early");
}

#[tokio::test]
async fn chained_tunnel_forwards_parent_reply_untouched() {
    let parent_reply = "HTTP/1.1 200 OK\r\nVia: parent\r\n\r\n";
    let (parent, mut seen) = common::start_fake_parent(parent_reply).await;

    let mut config = ProxyConfig::default();
    config.upstream.parent_proxy = Some(format!("http://{parent}"));
    let proxy = common::start_proxy(config).await;

    let mut client = connect_request(&proxy, "example.com:443").await;

    let sent = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sent, b"CONNECT example.com:443 HTTP/1.1\r\n\r\n");

    // Only the parent's answer reaches the client.
    let head = common::read_head(&mut client).await;
    assert_eq!(head, parent_reply.as_bytes());

    client.write_all(b"through").await.unwrap();
    assert_eq!(read_exact_within(&mut client, 7).await, b"through");

    drop(client);
    proxy.wait_idle().await;
}

#[tokio::test]
async fn unreachable_target_is_502() {
    let closed = common::closed_addr().await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let mut client = connect_request(&proxy, &closed.to_string()).await;
    let head = common::read_head(&mut client).await;
    assert!(
        head.starts_with(b"HTTP/1.1 502 Bad Gateway\r\n"),
        "{}",
        String::from_utf8_lossy(&head)
    );

    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
    proxy.wait_idle().await;
}

#[tokio::test]
async fn disallowed_port_is_403() {
    let echo = common::start_echo_server().await;
    let mut config = ProxyConfig::default();
    config.access.allowed_connect_ports = vec![443];
    let proxy = common::start_proxy(config).await;

    let mut client = connect_request(&proxy, &echo.to_string()).await;
    let head = common::read_head(&mut client).await;
    assert!(head.starts_with(b"HTTP/1.1 403 Forbidden\r\n"));
    proxy.wait_idle().await;
}

/// Delegate whose parent lookup always fails.
#[derive(Default)]
struct BrokenParent {
    logged: AtomicUsize,
}

impl Delegate for BrokenParent {
    fn parent_proxy(&self, _req: &Request<Body>) -> Result<Option<Url>, BoxError> {
        Err("parent registry unavailable".into())
    }

    fn error_log(&self, err: &ProxyError) {
        if matches!(err, ProxyError::ParentProxy { .. }) {
            self.logged.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn parent_lookup_failure_is_502_then_close() {
    let delegate = Arc::new(BrokenParent::default());
    let proxy = Proxy::builder()
        .delegate(delegate.clone())
        .build()
        .unwrap();
    let proxy = common::start_with(Arc::new(proxy), ProxyConfig::default()).await;

    let mut client = connect_request(&proxy, "example.com:443").await;
    let head = common::read_head(&mut client).await;
    assert!(
        head.starts_with(b"HTTP/1.1 502 Bad Gateway\r\n"),
        "{}",
        String::from_utf8_lossy(&head)
    );

    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert!(rest.is_empty());

    proxy.wait_idle().await;
    assert_eq!(delegate.logged.load(Ordering::SeqCst), 1);
}
