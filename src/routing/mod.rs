//! Routing subsystem: where a request leaves this proxy.
//!
//! # Data Flow
//! ```text
//! Request target (absolute URI / CONNECT authority / Host)
//!     → matcher.rs (evaluate bypass host patterns)
//!     → parent.rs (configured parent proxy, unless bypassed)
//!     → Return: parent URL or direct
//! ```
//!
//! # Design Decisions
//! - Built once from config, immutable at runtime
//! - No regex in hot path (exact and suffix matching only)
//! - Deterministic: same target always gets the same decision

pub mod matcher;
pub mod parent;

pub use matcher::{target_host, AnyMatcher, HostMatcher, Matcher};
pub use parent::{ParentConfigError, ParentRouter};
