//! Client-facing HTTP handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (read + parse first request head)
//!     → server.rs (CONNECT → raw path, otherwise → hyper HTTP/1)
//!     → proxy::Proxy::handle
//!     → response.rs (raw or hyper response sink)
//!     → client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use response::{HyperResponseWriter, RawResponseWriter};
pub use server::ProxyServer;
