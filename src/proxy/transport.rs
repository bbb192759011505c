//! Round-trip capability.
//!
//! # Responsibilities
//! - Send one forwarded request upstream, streaming the request body, and
//!   hand back the response head with a streaming body
//! - Pool upstream connections, one pool for direct traffic and one per
//!   parent proxy
//!
//! # Design Decisions
//! - `RoundTrip` is a trait object seam so tests and embedders can swap it
//! - Redirects are never followed; the client sees the upstream's 3xx as-is
//! - System proxy settings are ignored; parent chaining is decided per request
//!   by the delegate and passed in explicitly

use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use http::{Request, Response};
use http_body::Body as _;
use url::Url;

use crate::config::TransportConfig;
use crate::proxy::error::BoxError;
use crate::proxy::Body;
use crate::security::headers::copy_headers;

/// Performs a single upstream exchange.
pub trait RoundTrip: Send + Sync {
    /// Send `req` either directly or through `parent`.
    fn round_trip(
        &self,
        req: Request<Body>,
        parent: Option<Url>,
    ) -> BoxFuture<'_, Result<Response<Body>, BoxError>>;
}

/// Pool and timeout settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub connect_timeout: Duration,
    pub tcp_keepalive: Duration,
    pub max_idle_per_host: usize,
    pub idle_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            tcp_keepalive: Duration::from_secs(30),
            max_idle_per_host: 100,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

impl From<&TransportConfig> for TransportSettings {
    fn from(config: &TransportConfig) -> Self {
        Self {
            connect_timeout: config.dial_timeout(),
            tcp_keepalive: config.tcp_keepalive(),
            max_idle_per_host: config.max_idle_per_host,
            idle_timeout: config.idle_timeout(),
        }
    }
}

impl TransportSettings {
    /// No idle connections are kept, so every upstream connection serves one request.
    pub fn without_keep_alive(mut self) -> Self {
        self.max_idle_per_host = 0;
        self
    }
}

/// Default [`RoundTrip`] backed by pooled `reqwest` clients.
pub struct HttpTransport {
    settings: TransportSettings,
    direct: reqwest::Client,
    via_parent: DashMap<Url, reqwest::Client>,
}

impl HttpTransport {
    pub fn new(settings: TransportSettings) -> Result<Self, reqwest::Error> {
        let direct = client_builder(&settings).build()?;
        Ok(Self {
            settings,
            direct,
            via_parent: DashMap::new(),
        })
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    fn client_for(&self, parent: Option<Url>) -> Result<reqwest::Client, reqwest::Error> {
        let Some(parent) = parent else {
            return Ok(self.direct.clone());
        };
        if let Some(client) = self.via_parent.get(&parent) {
            return Ok(client.clone());
        }
        let client = client_builder(&self.settings)
            .proxy(reqwest::Proxy::all(parent.clone())?)
            .build()?;
        tracing::debug!(parent = %parent, "built upstream client for parent proxy");
        Ok(self.via_parent.entry(parent).or_insert(client).clone())
    }

    async fn send(
        &self,
        req: Request<Body>,
        parent: Option<Url>,
    ) -> Result<Response<Body>, BoxError> {
        let client = self.client_for(parent)?;
        let (parts, body) = req.into_parts();
        let url = Url::parse(&parts.uri.to_string())?;
        let has_body = !body.is_end_stream();

        // Content-Length from the client is kept, so a sized body is not
        // re-framed as chunked.
        let mut builder = client
            .request(parts.method, url)
            .headers(parts.headers);
        if has_body {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        let upstream = builder.send().await?;

        let mut response = Response::builder()
            .status(upstream.status())
            .version(upstream.version());
        if let Some(headers) = response.headers_mut() {
            copy_headers(headers, upstream.headers());
        }
        Ok(response.body(Body::from_stream(upstream.bytes_stream()))?)
    }
}

impl RoundTrip for HttpTransport {
    fn round_trip(
        &self,
        req: Request<Body>,
        parent: Option<Url>,
    ) -> BoxFuture<'_, Result<Response<Body>, BoxError>> {
        Box::pin(self.send(req, parent))
    }
}

fn client_builder(settings: &TransportSettings) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .connect_timeout(settings.connect_timeout)
        .tcp_keepalive(settings.tcp_keepalive)
        .pool_max_idle_per_host(settings.max_idle_per_host)
        .pool_idle_timeout(settings.idle_timeout)
}
