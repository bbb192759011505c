//! Target host matching.
//!
//! # Responsibilities
//! - Extract the target host of a proxied request (absolute URI, CONNECT
//!   authority, or `Host` header as a fallback)
//! - Match it exactly or by domain suffix, case-insensitively
//! - Combine matchers with OR semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive (per HTTP spec)
//! - A pattern starting with '.' matches the bare domain and every subdomain
//! - No regex to guarantee O(n) matching

use http::header::HOST;
use http::Request;

use crate::proxy::Body;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;
}

/// Lowercased target host of a proxied request, without port.
pub fn target_host(req: &Request<Body>) -> Option<String> {
    if let Some(host) = req.uri().host() {
        return Some(host.trim_matches(['[', ']']).to_ascii_lowercase());
    }
    let header = req.headers().get(HOST)?.to_str().ok()?;
    let host = match header.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => header,
    };
    Some(host.trim_matches(['[', ']']).to_ascii_lowercase())
}

/// Matches the request's target host.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    pattern: HostPattern,
}

#[derive(Debug, Clone)]
enum HostPattern {
    Exact(String),
    /// Stored with its leading dot.
    Suffix(String),
}

impl HostMatcher {
    /// Create a host matcher. `.example.com` matches `example.com` and any
    /// subdomain; anything else matches exactly.
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into().trim().to_ascii_lowercase();
        let pattern = if host.starts_with('.') {
            HostPattern::Suffix(host)
        } else {
            HostPattern::Exact(host)
        };
        Self { pattern }
    }

    pub fn matches_host(&self, host: &str) -> bool {
        match &self.pattern {
            HostPattern::Exact(expected) => host.eq_ignore_ascii_case(expected),
            HostPattern::Suffix(suffix) => {
                let host = host.to_ascii_lowercase();
                host.ends_with(suffix.as_str()) || host == suffix[1..]
            }
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        target_host(req)
            .map(|host| self.matches_host(&host))
            .unwrap_or(false)
    }
}

/// Combines multiple matchers with OR semantics. Empty never matches.
#[derive(Debug, Default)]
pub struct AnyMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AnyMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl Matcher for AnyMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.matchers.iter().any(|m| m.matches(req))
    }
}
