//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → access_control.rs (client IP allow-list, Connect stage)
//!     → auth.rs (Basic proxy credentials, Auth stage)
//!     → access_control.rs (CONNECT port allow-list, BeforeTunnelForward stage)
//!     → headers.rs (strip hop-by-hop headers both ways, HTTP only)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input
//! - Tunnel payloads are never inspected

pub mod access_control;
pub mod auth;
pub mod headers;

pub use access_control::AccessControl;
pub use auth::{AuthenticatedUser, ProxyAuth};
pub use headers::{copy_headers, remove_hop_headers};
