//! Basic proxy authentication (RFC 7617 credentials in `Proxy-Authorization`).

use base64::{engine::general_purpose::STANDARD, Engine};
use http::header::{HeaderValue, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION};
use http::{HeaderMap, Response, StatusCode};

use crate::config::AuthConfig;
use crate::proxy::Body;

/// Name of the authenticated user, stored in the request context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

#[derive(Debug, Clone)]
struct Credential {
    username: String,
    password: String,
}

/// Accepted proxy credentials.
#[derive(Debug, Clone)]
pub struct ProxyAuth {
    credentials: Vec<Credential>,
    realm: String,
}

impl ProxyAuth {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            credentials: config
                .users
                .iter()
                .map(|u| Credential {
                    username: u.username.clone(),
                    password: u.password.clone(),
                })
                .collect(),
            realm: config.realm.clone(),
        }
    }

    /// Check `Proxy-Authorization`; returns the username on success.
    pub fn verify(&self, headers: &HeaderMap) -> Option<String> {
        let value = headers.get(PROXY_AUTHORIZATION)?.to_str().ok()?;
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        // user-id cannot contain a colon, the password may
        let (user, password) = decoded.split_once(':')?;

        let mut found = false;
        for cred in &self.credentials {
            let user_match = constant_time_eq(cred.username.as_bytes(), user.as_bytes());
            let pass_match = constant_time_eq(cred.password.as_bytes(), password.as_bytes());
            found |= user_match && pass_match;
        }
        found.then(|| user.to_string())
    }

    /// 407 response carrying the Basic challenge.
    pub fn challenge(&self) -> Response<Body> {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::PROXY_AUTHENTICATION_REQUIRED;
        let challenge = format!("Basic realm=\"{}\"", self.realm.replace('"', ""));
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            response.headers_mut().insert(PROXY_AUTHENTICATE, value);
        }
        response
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len_eq = a.len() == b.len();
    let mut diff = 0u8;
    for i in 0..a.len().max(b.len()) {
        diff |= a.get(i).copied().unwrap_or(0) ^ b.get(i).copied().unwrap_or(0);
    }
    len_eq && diff == 0
}
