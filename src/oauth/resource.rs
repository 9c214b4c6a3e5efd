//! Resource indicators (RFC 8707).
//!
//! Every code and token may be bound to one protected-resource URI. The
//! [`ResourcePolicy`] holds the canonical URI this server protects and decides,
//! in strict mode, whether a requested or bound resource is acceptable.

use url::Url;

use crate::errors::OAuthError;

/// Canonical form of a resource URI.
///
/// Scheme and host are lowercased, default ports dropped and a trailing slash
/// trimmed from non-root paths. Queries and fragments are rejected, and plain
/// `http` is only accepted for loopback hosts.
pub fn canonicalize_resource_uri(uri: &str) -> Result<String, OAuthError> {
    let url = Url::parse(uri)
        .map_err(|e| OAuthError::InvalidRequest(format!("Invalid resource URI '{uri}': {e}")))?;

    let host = url
        .host_str()
        .ok_or_else(|| OAuthError::InvalidRequest("Resource URI must have a host".to_string()))?;

    match url.scheme() {
        "https" => {}
        "http" if is_loopback(host) => {}
        scheme => {
            return Err(OAuthError::InvalidRequest(format!(
                "Resource URI scheme '{scheme}' is not allowed"
            )));
        }
    }

    if url.fragment().is_some() {
        return Err(OAuthError::InvalidRequest(
            "Resource URI must not contain a fragment".to_string(),
        ));
    }

    if url.query().is_some() {
        return Err(OAuthError::InvalidRequest(
            "Resource URI must not contain a query".to_string(),
        ));
    }

    let mut canonical = format!("{}://{}", url.scheme(), host.to_lowercase());
    if let Some(port) = url.port() {
        canonical.push_str(&format!(":{port}"));
    }

    let path = url.path();
    if path != "/" {
        canonical.push_str(path.trim_end_matches('/'));
    }

    Ok(canonical)
}

pub(crate) fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "[::1]")
}

/// Resource binding rules for one protected resource.
#[derive(Clone, Debug)]
pub struct ResourcePolicy {
    canonical: String,
    strict: bool,
}

impl ResourcePolicy {
    pub fn new(resource_uri: &str, strict: bool) -> Result<Self, OAuthError> {
        Ok(Self {
            canonical: canonicalize_resource_uri(resource_uri)?,
            strict,
        })
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Validate a `resource` parameter sent by a client.
    ///
    /// Returns the canonical form to bind, or `None` when the client sent none.
    /// In strict mode anything other than this server's resource is rejected.
    pub fn resolve_requested(&self, requested: Option<&str>) -> Result<Option<String>, OAuthError> {
        let Some(requested) = requested.filter(|value| !value.is_empty()) else {
            return Ok(None);
        };

        let resource = canonicalize_resource_uri(requested)?;
        if self.strict && resource != self.canonical {
            return Err(OAuthError::InvalidRequest(format!(
                "Resource '{requested}' is not served by this server"
            )));
        }

        Ok(Some(resource))
    }

    /// Whether a token bound to `bound` may be used against this resource.
    pub fn accepts_bound(&self, bound: Option<&str>) -> bool {
        !self.strict || bound == Some(self.canonical.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_resource_uri() {
        assert_eq!(
            canonicalize_resource_uri("HTTPS://API.Example.COM/mcp/").unwrap(),
            "https://api.example.com/mcp"
        );
        assert_eq!(
            canonicalize_resource_uri("https://api.example.com:443/mcp").unwrap(),
            "https://api.example.com/mcp"
        );
        assert_eq!(
            canonicalize_resource_uri("https://api.example.com:8443/mcp").unwrap(),
            "https://api.example.com:8443/mcp"
        );
        assert_eq!(
            canonicalize_resource_uri("https://api.example.com/").unwrap(),
            "https://api.example.com"
        );
        assert_eq!(
            canonicalize_resource_uri("http://localhost:8080/mcp").unwrap(),
            "http://localhost:8080/mcp"
        );
    }

    #[test]
    fn test_canonicalize_rejects_bad_uris() {
        assert!(canonicalize_resource_uri("https://api.example.com/mcp#frag").is_err());
        assert!(canonicalize_resource_uri("https://api.example.com/mcp?x=1").is_err());
        assert!(canonicalize_resource_uri("https://api.example.com/mcp?").is_err());
        assert!(canonicalize_resource_uri("http://api.example.com/mcp").is_err());
        assert!(canonicalize_resource_uri("ftp://api.example.com/mcp").is_err());
        assert!(canonicalize_resource_uri("not a uri").is_err());
    }

    #[test]
    fn test_strict_policy() {
        let policy = ResourcePolicy::new("https://a.example.com/mcp", true).unwrap();

        assert_eq!(policy.resolve_requested(None).unwrap(), None);
        assert_eq!(
            policy
                .resolve_requested(Some("https://A.example.com/mcp/"))
                .unwrap(),
            Some("https://a.example.com/mcp".to_string())
        );

        let err = policy
            .resolve_requested(Some("https://b.example.com/mcp"))
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_request");

        let err = policy
            .resolve_requested(Some("https://a.example.com/mcp?tenant=other"))
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_request");

        assert!(policy.accepts_bound(Some("https://a.example.com/mcp")));
        assert!(!policy.accepts_bound(Some("https://b.example.com/mcp")));
        assert!(!policy.accepts_bound(None));
    }

    #[test]
    fn test_lenient_policy() {
        let policy = ResourcePolicy::new("https://a.example.com/mcp", false).unwrap();

        assert_eq!(
            policy
                .resolve_requested(Some("https://b.example.com/mcp"))
                .unwrap(),
            Some("https://b.example.com/mcp".to_string())
        );
        assert!(policy.accepts_bound(Some("https://b.example.com/mcp")));
        assert!(policy.accepts_bound(None));

        // Malformed URIs are rejected regardless of mode
        assert!(policy.resolve_requested(Some("https://b.example.com#x")).is_err());
    }
}
