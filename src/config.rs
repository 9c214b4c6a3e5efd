//! Environment-based configuration types for server runtime settings.

use anyhow::Result;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::oauth::clients::SeedClient;
use crate::oauth::resource::canonicalize_resource_uri;
use crate::oauth::types::validate_scope;

/// HTTP server port configuration
#[derive(Clone, Debug)]
pub struct HttpPort(u16);

/// Lifetime applied to an issued code or token
#[derive(Clone, Debug)]
pub struct Expiration(chrono::Duration);

/// OAuth supported scopes configuration
#[derive(Clone, Debug)]
pub struct OAuthSupportedScopes(Vec<String>);

/// Scopes the protected resource demands of every token
#[derive(Clone, Debug, Default)]
pub struct RequiredScopes(BTreeSet<String>);

/// Canonical URI of the protected resource
#[derive(Clone, Debug)]
pub struct ResourceUri(String);

/// Interval of the optional expiry sweep
#[derive(Clone, Debug, Default)]
pub struct CleanupInterval(Option<Duration>);

/// CORS allowed origins; empty allows any origin
#[derive(Clone, Debug, Default)]
pub struct CorsAllowedOrigins(Vec<String>);

/// Main application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub version: String,
    pub http_port: HttpPort,
    pub external_base: String,
    pub resource_uri: ResourceUri,
    pub strict_resource: bool,
    pub oauth_supported_scopes: OAuthSupportedScopes,
    pub resource_required_scopes: RequiredScopes,
    pub authorization_code_expiration: Expiration,
    pub access_token_expiration: Expiration,
    pub refresh_token_expiration: Expiration,
    pub enable_client_registration: bool,
    pub max_redirect_uris: usize,
    pub clients_file: Option<String>,
    pub cleanup_interval: CleanupInterval,
    pub cors_allowed_origins: CorsAllowedOrigins,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create a configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let external_base = require_env(&lookup, "EXTERNAL_BASE")?
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&external_base).map_err(|e| {
            ConfigError::InvalidUrl("EXTERNAL_BASE".to_string(), e.to_string())
        })?;

        let http_port: HttpPort = default_env(&lookup, "HTTP_PORT", "8080").try_into()?;
        let resource_uri: ResourceUri = default_env(
            &lookup,
            "RESOURCE_URI",
            &format!("{external_base}/mcp"),
        )
        .try_into()?;
        let strict_resource = parse_bool(default_env(&lookup, "STRICT_RESOURCE", "true"))?;
        let oauth_supported_scopes: OAuthSupportedScopes =
            default_env(&lookup, "OAUTH_SUPPORTED_SCOPES", "mcp:tools").try_into()?;
        let resource_required_scopes: RequiredScopes =
            optional_env(&lookup, "RESOURCE_REQUIRED_SCOPES").try_into()?;
        let authorization_code_expiration: Expiration =
            default_env(&lookup, "AUTHORIZATION_CODE_EXPIRATION", "5m").try_into()?;
        let access_token_expiration: Expiration =
            default_env(&lookup, "ACCESS_TOKEN_EXPIRATION", "1h").try_into()?;
        let refresh_token_expiration: Expiration =
            default_env(&lookup, "REFRESH_TOKEN_EXPIRATION", "1d").try_into()?;
        let enable_client_registration =
            parse_bool(default_env(&lookup, "ENABLE_CLIENT_REGISTRATION", "true"))?;
        let max_redirect_uris = default_env(&lookup, "MAX_REDIRECT_URIS", "10")
            .parse::<usize>()
            .map_err(|e| ConfigError::NumberParsingFailed("MAX_REDIRECT_URIS".to_string(), e))?;
        let clients_file = optional_env(&lookup, "CLIENTS_FILE").filter(|s| !s.is_empty());
        let cleanup_interval: CleanupInterval =
            optional_env(&lookup, "CLEANUP_INTERVAL").try_into()?;
        let cors_allowed_origins: CorsAllowedOrigins =
            optional_env(&lookup, "CORS_ALLOWED_ORIGINS").try_into()?;

        let resource_path = resource_uri.path();
        if RESERVED_PATHS.contains(&resource_path.as_str())
            || resource_path.starts_with("/.well-known")
        {
            return Err(ConfigError::InvalidUrl(
                "RESOURCE_URI".to_string(),
                format!("path {resource_path} is already served by the authorization server"),
            )
            .into());
        }

        if resource_path.split('/').any(|segment| {
            segment.starts_with(':')
                || segment.starts_with('*')
                || segment.contains(['{', '}'])
        }) {
            return Err(ConfigError::InvalidUrl(
                "RESOURCE_URI".to_string(),
                format!("path {resource_path} contains route capture syntax"),
            )
            .into());
        }

        for scope in resource_required_scopes.as_ref() {
            if !oauth_supported_scopes.as_ref().contains(scope) {
                return Err(ConfigError::InvalidScope(format!(
                    "required scope '{scope}' is not in OAUTH_SUPPORTED_SCOPES"
                ))
                .into());
            }
        }

        Ok(Self {
            version: version()?,
            http_port,
            external_base,
            resource_uri,
            strict_resource,
            oauth_supported_scopes,
            resource_required_scopes,
            authorization_code_expiration,
            access_token_expiration,
            refresh_token_expiration,
            enable_client_registration,
            max_redirect_uris,
            clients_file,
            cleanup_interval,
            cors_allowed_origins,
        })
    }

    /// URL of the protected resource metadata document
    pub fn resource_metadata_url(&self) -> String {
        format!("{}/.well-known/oauth-protected-resource", self.external_base)
    }

    /// Router path serving the protected resource
    pub fn resource_path(&self) -> String {
        self.resource_uri.path()
    }
}

/// Paths owned by the authorization server endpoints
const RESERVED_PATHS: [&str; 4] = ["/register", "/authorize", "/token", "/revoke"];

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

/// Read the operator-provided clients from a JSON array file
pub async fn load_seed_clients(path: &str) -> Result<Vec<SeedClient>, ConfigError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::ClientsFileFailed(path.to_string(), e.to_string()))?;
    serde_json::from_str(&contents)
        .map_err(|e| ConfigError::ClientsFileFailed(path.to_string(), e.to_string()))
}

fn require_env<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Result<String> {
    lookup(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::EnvVarRequired(name.to_string()).into())
}

fn optional_env<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<String> {
    lookup(name)
}

fn default_env<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    name: &str,
    default_value: &str,
) -> String {
    lookup(name).unwrap_or_else(|| default_value.to_string())
}

fn parse_bool(value: String) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::BoolParsingFailed(value)),
    }
}

fn parse_duration(value: String) -> Result<Duration, ConfigError> {
    duration_str::parse(&value).map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))
}

fn parse_scope_list(value: &str) -> Result<Vec<String>, ConfigError> {
    let mut scopes: Vec<String> = Vec::new();
    for scope in value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
    {
        if !validate_scope(scope) {
            return Err(ConfigError::InvalidScope(scope.to_string()));
        }
        if !scopes.iter().any(|existing| existing == scope) {
            scopes.push(scope.to_string());
        }
    }
    Ok(scopes)
}

impl TryFrom<String> for HttpPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Ok(Self(8080))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|err| ConfigError::PortParsingFailed(err).into())
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<String> for Expiration {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let duration = parse_duration(value)?;
        Ok(Self(chrono::Duration::from_std(duration)?))
    }
}

impl AsRef<chrono::Duration> for Expiration {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for OAuthSupportedScopes {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self(parse_scope_list(&value)?))
    }
}

impl AsRef<Vec<String>> for OAuthSupportedScopes {
    fn as_ref(&self) -> &Vec<String> {
        &self.0
    }
}

impl TryFrom<Option<String>> for RequiredScopes {
    type Error = anyhow::Error;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        let value = value.unwrap_or_default();
        Ok(Self(parse_scope_list(&value)?.into_iter().collect()))
    }
}

impl AsRef<BTreeSet<String>> for RequiredScopes {
    fn as_ref(&self) -> &BTreeSet<String> {
        &self.0
    }
}

impl TryFrom<String> for ResourceUri {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let canonical = canonicalize_resource_uri(&value)
            .map_err(|e| ConfigError::InvalidUrl("RESOURCE_URI".to_string(), e.to_string()))?;
        Ok(Self(canonical))
    }
}

impl ResourceUri {
    fn path(&self) -> String {
        url::Url::parse(&self.0)
            .map(|url| url.path().to_string())
            .unwrap_or_else(|_| "/".to_string())
    }
}

impl AsRef<String> for ResourceUri {
    fn as_ref(&self) -> &String {
        &self.0
    }
}

impl TryFrom<Option<String>> for CleanupInterval {
    type Error = anyhow::Error;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        match value {
            None => Ok(Self(None)),
            Some(v) if v.is_empty() => Ok(Self(None)),
            Some(v) => {
                let interval = parse_duration(v)?;
                Ok(Self(Some(interval).filter(|d| !d.is_zero())))
            }
        }
    }
}

impl AsRef<Option<Duration>> for CleanupInterval {
    fn as_ref(&self) -> &Option<Duration> {
        &self.0
    }
}

impl TryFrom<Option<String>> for CorsAllowedOrigins {
    type Error = anyhow::Error;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        let value = value.unwrap_or_default();
        Ok(Self(
            value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ))
    }
}

impl AsRef<Vec<String>> for CorsAllowedOrigins {
    fn as_ref(&self) -> &Vec<String> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("EXTERNAL_BASE", "https://auth.example.com/")]).unwrap();

        assert_eq!(config.external_base, "https://auth.example.com");
        assert_eq!(*config.http_port.as_ref(), 8080);
        assert_eq!(config.resource_uri.as_ref(), "https://auth.example.com/mcp");
        assert!(config.strict_resource);
        assert_eq!(config.oauth_supported_scopes.as_ref(), &vec!["mcp:tools".to_string()]);
        assert!(config.resource_required_scopes.as_ref().is_empty());
        assert_eq!(config.authorization_code_expiration.as_ref().num_seconds(), 300);
        assert_eq!(config.access_token_expiration.as_ref().num_seconds(), 3600);
        assert_eq!(config.refresh_token_expiration.as_ref().num_seconds(), 86400);
        assert!(config.enable_client_registration);
        assert_eq!(config.max_redirect_uris, 10);
        assert!(config.clients_file.is_none());
        assert!(config.cleanup_interval.as_ref().is_none());
        assert!(config.cors_allowed_origins.as_ref().is_empty());
        assert_eq!(
            config.resource_metadata_url(),
            "https://auth.example.com/.well-known/oauth-protected-resource"
        );
        assert_eq!(config.resource_path(), "/mcp");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("EXTERNAL_BASE", "http://localhost:8080"),
            ("HTTP_PORT", "9090"),
            ("RESOURCE_URI", "HTTP://LOCALHOST:8080/tools/"),
            ("STRICT_RESOURCE", "off"),
            ("OAUTH_SUPPORTED_SCOPES", "read, write read"),
            ("RESOURCE_REQUIRED_SCOPES", "read"),
            ("ACCESS_TOKEN_EXPIRATION", "15m"),
            ("ENABLE_CLIENT_REGISTRATION", "no"),
            ("CLEANUP_INTERVAL", "30s"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example.com, https://b.example.com"),
        ])
        .unwrap();

        assert_eq!(*config.http_port.as_ref(), 9090);
        assert_eq!(config.resource_uri.as_ref(), "http://localhost:8080/tools");
        assert_eq!(config.resource_path(), "/tools");
        assert!(!config.strict_resource);
        assert_eq!(
            config.oauth_supported_scopes.as_ref(),
            &vec!["read".to_string(), "write".to_string()]
        );
        assert!(config.resource_required_scopes.as_ref().contains("read"));
        assert_eq!(config.access_token_expiration.as_ref().num_minutes(), 15);
        assert!(!config.enable_client_registration);
        assert_eq!(
            *config.cleanup_interval.as_ref(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.cors_allowed_origins.as_ref().len(), 2);
    }

    #[tokio::test]
    async fn test_load_seed_clients() {
        let path = std::env::temp_dir().join(format!("toolgate-clients-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            r#"[{"client_id": "agent", "client_secret": "s3cret", "redirect_uris": ["https://cb/x"]}]"#,
        )
        .await
        .unwrap();
        let path = path.to_string_lossy().to_string();

        let clients = load_seed_clients(&path).await.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].client_id, "agent");
        assert_eq!(clients[0].client_secret.as_deref(), Some("s3cret"));

        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(
            load_seed_clients(&path).await,
            Err(ConfigError::ClientsFileFailed(_, _))
        ));

        tokio::fs::remove_file(&path).await.unwrap();
        assert!(load_seed_clients(&path).await.is_err());
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("EXTERNAL_BASE", "not a url")]).is_err());

        let base = ("EXTERNAL_BASE", "https://auth.example.com");
        assert!(config_from(&[base, ("HTTP_PORT", "http")]).is_err());
        assert!(config_from(&[base, ("STRICT_RESOURCE", "maybe")]).is_err());
        assert!(config_from(&[base, ("ACCESS_TOKEN_EXPIRATION", "soon")]).is_err());
        assert!(config_from(&[base, ("RESOURCE_URI", "https://a.example.com/mcp#x")]).is_err());
        assert!(config_from(&[base, ("RESOURCE_URI", "https://a.example.com/mcp?x=1")]).is_err());
        assert!(config_from(&[base, ("RESOURCE_REQUIRED_SCOPES", "admin")]).is_err());
        assert!(config_from(&[base, ("RESOURCE_URI", "https://auth.example.com/token")]).is_err());
        assert!(config_from(&[base, ("RESOURCE_URI", "https://auth.example.com/:tools")]).is_err());
        assert!(config_from(&[base, ("RESOURCE_URI", "https://auth.example.com/v1/*rest")]).is_err());
        assert!(config_from(&[base, ("OAUTH_SUPPORTED_SCOPES", "bad\"scope")]).is_err());
    }
}
