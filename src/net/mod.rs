//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → http::server (peek request head, pick a serving path)
//!     → rewind.rs (replay peeked bytes to hyper or the tunnel relay)
//!     → connection.rs (in-flight request gauge)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - The in-flight gauge is owned by the `Proxy` instance, not a global

pub mod connection;
pub mod listener;
pub mod rewind;

pub use connection::{ConnectionGuard, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use rewind::Rewind;
