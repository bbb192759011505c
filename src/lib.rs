//! Forward HTTP/HTTPS proxy.
//!
//! Plain HTTP requests are rewritten and forwarded through a pooled client;
//! CONNECT requests become opaque TCP tunnels. Every request passes through
//! a [`Delegate`](proxy::Delegate) hook pipeline, optionally chaining through
//! a parent proxy.

// Core
pub mod proxy;
pub mod security;
pub mod routing;
pub mod policy;

// Serving
pub mod config;
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use crate::http::ProxyServer;
pub use lifecycle::Shutdown;
pub use policy::PolicyDelegate;
pub use proxy::{DefaultDelegate, Delegate, Proxy, ProxyBuilder};
