//! Hop-by-hop header sanitization.
//!
//! # Responsibilities
//! - Strip every header listed in the `Connection` header value
//! - Strip the fixed hop-by-hop header set
//! - Copy header collections between request/response objects
//!
//! # Design Decisions
//! - The `Connection` list is read from the headers being sanitized, never cached
//! - Applied to outbound requests and inbound responses on the HTTP path only;
//!   tunnel traffic is opaque and never touched

use http::header::{HeaderMap, HeaderName, CONNECTION};

/// Headers that are meaningful for a single transport hop only.
pub const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove connection-scoped headers from `headers`.
///
/// Headers named in the `Connection` value are removed first, then the
/// fixed hop-by-hop set. Applying this twice is the same as applying it once.
pub fn remove_hop_headers(headers: &mut HeaderMap) {
    remove_connection_headers(headers);
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

fn remove_connection_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| HeaderName::from_bytes(token.as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(&name);
    }
}

/// Append every value of `src` onto `dst`, keeping existing values in `dst`.
pub fn copy_headers(dst: &mut HeaderMap, src: &HeaderMap) {
    for (name, value) in src {
        dst.append(name.clone(), value.clone());
    }
}
