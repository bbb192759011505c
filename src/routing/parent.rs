//! Parent proxy selection.

use http::Request;
use url::Url;

use crate::config::UpstreamConfig;
use crate::proxy::Body;
use crate::routing::matcher::{AnyMatcher, HostMatcher, Matcher};

/// Error type for building a [`ParentRouter`].
#[derive(Debug, thiserror::Error)]
#[error("invalid parent proxy URL '{url}': {source}")]
pub struct ParentConfigError {
    url: String,
    #[source]
    source: url::ParseError,
}

/// Chooses between the configured parent proxy and a direct connection.
#[derive(Debug, Default)]
pub struct ParentRouter {
    parent: Option<Url>,
    bypass: AnyMatcher,
}

impl ParentRouter {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, ParentConfigError> {
        let parent = config
            .parent_proxy
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|source| ParentConfigError {
                    url: raw.to_string(),
                    source,
                })
            })
            .transpose()?;

        let bypass = config
            .bypass
            .iter()
            .map(|host| Box::new(HostMatcher::new(host.as_str())) as Box<dyn Matcher>)
            .collect();

        Ok(Self {
            parent,
            bypass: AnyMatcher::new(bypass),
        })
    }

    /// Parent to use for `req`, or `None` to connect directly.
    pub fn resolve(&self, req: &Request<Body>) -> Option<Url> {
        let parent = self.parent.as_ref()?;
        if self.bypass.matches(req) {
            return None;
        }
        Some(parent.clone())
    }

    pub fn parent(&self) -> Option<&Url> {
        self.parent.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn no_parent_means_direct() {
        let router = ParentRouter::from_config(&UpstreamConfig::default()).unwrap();
        assert!(router.resolve(&to("http://example.com/")).is_none());
    }

    #[test]
    fn bypass_hosts_go_direct() {
        let router = ParentRouter::from_config(&UpstreamConfig {
            parent_proxy: Some("http://10.0.0.1:3128".into()),
            bypass: vec!["localhost".into(), ".corp.local".into()],
        })
        .unwrap();

        let parent = router.resolve(&to("example.com:443")).unwrap();
        assert_eq!(parent.as_str(), "http://10.0.0.1:3128/");
        assert!(router.resolve(&to("http://localhost:8080/")).is_none());
        assert!(router.resolve(&to("wiki.corp.local:443")).is_none());
    }

    #[test]
    fn rejects_unparseable_parent() {
        let err = ParentRouter::from_config(&UpstreamConfig {
            parent_proxy: Some("::nope".into()),
            bypass: Vec::new(),
        })
        .unwrap_err();
        assert!(err.to_string().starts_with("invalid parent proxy URL '::nope'"));
    }
}
