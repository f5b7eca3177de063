//! Core utilities and shared types for the fedwatch engine.

use url::Url;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Raised when a noticed URL cannot be reduced to a `scheme://host` identity.
#[derive(Debug, thiserror::Error)]
#[error("invalid url: {0}")]
pub struct InvalidUrl(pub String);

/// Normalized node identity: `scheme://host`, no path, query or trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseUrl(String);

impl BaseUrl {
    /// Reduce an arbitrary URL to its base. Path and query are discarded; an
    /// explicit non-default port is part of the node's identity and kept.
    pub fn parse(raw: &str) -> Result<Self, InvalidUrl> {
        let parsed = Url::parse(raw).map_err(|_| InvalidUrl(raw.to_string()))?;
        let host = parsed.host_str().ok_or_else(|| InvalidUrl(raw.to_string()))?;
        let mut base = format!("{}://{}", parsed.scheme(), host);
        if let Some(port) = parsed.port() {
            base.push_str(&format!(":{port}"));
        }
        Ok(BaseUrl(base))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_https(&self) -> bool {
        self.0.starts_with("https://")
    }
}

impl std::fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }

    #[test]
    fn strips_path_and_query() {
        let b = BaseUrl::parse("https://example.com/profile/bob?x=1").unwrap();
        assert_eq!(b.as_str(), "https://example.com");
    }

    #[test]
    fn keeps_scheme() {
        let b = BaseUrl::parse("http://node.example.org/friendica/json").unwrap();
        assert_eq!(b.as_str(), "http://node.example.org");
        assert!(!b.is_https());
        assert!(BaseUrl::parse("https://node.example.org").unwrap().is_https());
    }

    #[test]
    fn rejects_garbage() {
        assert!(BaseUrl::parse("not a url").is_err());
        assert!(BaseUrl::parse("mailto:bob@example.com").is_err());
        assert!(BaseUrl::parse("").is_err());
    }

    #[test]
    fn default_port_is_dropped_explicit_port_is_kept() {
        let b = BaseUrl::parse("https://example.com:443/x").unwrap();
        assert_eq!(b.as_str(), "https://example.com");
        let b = BaseUrl::parse("http://127.0.0.1:8080/friendica/json").unwrap();
        assert_eq!(b.as_str(), "http://127.0.0.1:8080");
    }

    #[test]
    fn no_trailing_slash() {
        let b = BaseUrl::parse("https://example.com/").unwrap();
        assert_eq!(b.as_str(), "https://example.com");
    }
}
