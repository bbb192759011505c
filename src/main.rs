//! Forward proxy server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::listener ──▶ http::server ──┬─ CONNECT ──▶ proxy::tunnel ──▶ target / parent
//!                                                 │
//!                                                 └─ other ────▶ proxy::http ───▶ transport ──▶ origin / parent
//!
//!     proxy::Proxy::handle:  connect → auth → (tunnel | http) → finish
//!     policy::PolicyDelegate supplies the hooks from config
//!     admin (optional):  GET /admin/status
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use forward_proxy::admin::{self, AdminState};
use forward_proxy::config::{load_config, ProxyConfig};
use forward_proxy::lifecycle::{signals, Shutdown};
use forward_proxy::net::Listener;
use forward_proxy::observability::{logging, metrics};
use forward_proxy::proxy::{Proxy, TransportSettings};
use forward_proxy::{PolicyDelegate, ProxyServer};

#[derive(Parser)]
#[command(name = "forward-proxy")]
#[command(about = "Forward HTTP/HTTPS proxy", long_about = None)]
struct Args {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "forward-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        parent_proxy = config.upstream.parent_proxy.as_deref().unwrap_or("none"),
        auth = config.auth.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let delegate = PolicyDelegate::from_config(&config)?;
    let proxy = Proxy::builder()
        .disable_keep_alive(config.transport.disable_keep_alive)
        .transport_settings(TransportSettings::from(&config.transport))
        .tunnel(config.tunnel.clone())
        .delegate(Arc::new(delegate))
        .build()?;
    let proxy = Arc::new(proxy);

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(&shutdown);

    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let router = admin::setup_admin_router(AdminState {
            proxy: proxy.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        });
        Some(tokio::spawn(admin::serve(listener, router, shutdown.subscribe())))
    } else {
        None
    };

    let listener = Listener::bind(&config.listener).await?;
    ProxyServer::new(proxy, &config.listener)
        .run(listener, shutdown.subscribe())
        .await?;

    if let Some(task) = admin_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
            Err(e) => tracing::error!(error = %e, "Admin API task panicked"),
            Ok(Ok(())) => {}
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
