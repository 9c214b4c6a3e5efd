//! OAuth 2.1 core types and data structures.
//!
//! Defines the records kept by the stores, the wire shapes of the token and
//! registration endpoints, and the helpers used to mint and compare them.

use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// OAuth 2.1 Grant Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

/// OAuth 2.1 Response Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Code,
}

/// OAuth 2.1 Token Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Bearer,
}

/// OAuth 2.1 Client Authentication Methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    ClientSecretBasic,
    ClientSecretPost,
    None,
}

/// PKCE code challenge methods (RFC 7636)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[serde(rename = "S256")]
    S256,
    #[serde(rename = "plain")]
    Plain,
}

impl CodeChallengeMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "S256" => Some(CodeChallengeMethod::S256),
            "plain" => Some(CodeChallengeMethod::Plain),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CodeChallengeMethod::S256 => "S256",
            CodeChallengeMethod::Plain => "plain",
        }
    }
}

/// Records with an absolute deadline.
///
/// Expiry is inclusive: a record whose deadline equals `now` is already expired.
pub trait Expires {
    fn expires_at(&self) -> DateTime<Utc>;

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// OAuth Client Registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    /// Unique client identifier
    pub client_id: String,
    /// Client secret (absent for public clients)
    pub client_secret: Option<String>,
    /// Client name
    pub client_name: Option<String>,
    /// Redirect URIs, matched exactly
    pub redirect_uris: Vec<String>,
    /// Grant types allowed for this client
    pub grant_types: Vec<GrantType>,
    /// Response types allowed for this client
    pub response_types: Vec<ResponseType>,
    /// Scopes that can be requested by this client
    pub scope: Option<String>,
    /// Client authentication method
    pub token_endpoint_auth_method: ClientAuthMethod,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
    /// Client metadata not otherwise modeled
    pub metadata: serde_json::Value,
}

impl OAuthClient {
    pub fn allows_grant(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    pub fn has_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }
}

/// OAuth Authorization Request, as validated by the authorization endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Response type as sent by the client
    pub response_type: Option<String>,
    /// Client ID
    pub client_id: String,
    /// Redirect URI
    pub redirect_uri: String,
    /// Requested scope
    pub scope: Option<String>,
    /// State parameter
    pub state: Option<String>,
    /// Code challenge for PKCE
    pub code_challenge: Option<String>,
    /// Code challenge method for PKCE
    pub code_challenge_method: Option<String>,
    /// Target resource (RFC 8707)
    pub resource: Option<String>,
}

/// OAuth Authorization Code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The authorization code
    pub code: String,
    /// Client ID that requested this code
    pub client_id: String,
    /// Redirect URI used in the authorization request
    pub redirect_uri: String,
    /// Granted scopes
    pub scopes: BTreeSet<String>,
    /// Code challenge for PKCE
    pub code_challenge: String,
    /// Code challenge method for PKCE
    pub code_challenge_method: CodeChallengeMethod,
    /// Resource the code is bound to
    pub resource: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
}

impl Expires for AuthorizationCode {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// OAuth Access Token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    /// The access token
    pub token: String,
    /// Token type
    pub token_type: TokenType,
    /// Client ID
    pub client_id: String,
    /// Granted scopes
    pub scopes: BTreeSet<String>,
    /// Resource the token is bound to
    pub resource: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
}

impl Expires for AccessToken {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// OAuth Refresh Token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    /// The refresh token
    pub token: String,
    /// Access token issued alongside this refresh token
    pub access_token: String,
    /// Client ID
    pub client_id: String,
    /// Granted scopes
    pub scopes: BTreeSet<String>,
    /// Resource the token is bound to
    pub resource: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
}

impl Expires for RefreshToken {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Token Exchange Request
#[derive(Debug, Clone)]
pub struct TokenRequest {
    /// Grant type
    pub grant_type: GrantType,
    /// Authorization code (for authorization_code grant)
    pub code: Option<String>,
    /// Redirect URI (for authorization_code grant)
    pub redirect_uri: Option<String>,
    /// Code verifier (for PKCE)
    pub code_verifier: Option<String>,
    /// Refresh token (for refresh_token grant)
    pub refresh_token: Option<String>,
    /// Requested scope
    pub scope: Option<String>,
    /// Target resource (RFC 8707)
    pub resource: Option<String>,
}

/// Token Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// Token type
    pub token_type: TokenType,
    /// Expires in seconds
    pub expires_in: u64,
    /// Refresh token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// OAuth Error Response
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    /// Error code
    pub error: String,
    /// Error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Client Registration Request (RFC 7591)
#[derive(Debug, Default, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Client name
    pub client_name: Option<String>,
    /// Redirect URIs
    pub redirect_uris: Option<Vec<String>>,
    /// Grant types
    pub grant_types: Option<Vec<GrantType>>,
    /// Response types
    pub response_types: Option<Vec<ResponseType>>,
    /// Scope
    pub scope: Option<String>,
    /// Token endpoint authentication method
    pub token_endpoint_auth_method: Option<ClientAuthMethod>,
    /// Additional metadata
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Client Registration Response (RFC 7591)
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    /// Client ID
    pub client_id: String,
    /// Client secret (for confidential clients)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Client name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Redirect URIs
    pub redirect_uris: Vec<String>,
    /// Grant types
    pub grant_types: Vec<GrantType>,
    /// Response types
    pub response_types: Vec<ResponseType>,
    /// Scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Token endpoint authentication method
    pub token_endpoint_auth_method: ClientAuthMethod,
    /// Client ID issued at
    pub client_id_issued_at: i64,
    /// Client secret expires at, 0 meaning never
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<i64>,
}

impl From<&OAuthClient> for ClientRegistrationResponse {
    fn from(client: &OAuthClient) -> Self {
        Self {
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            client_name: client.client_name.clone(),
            redirect_uris: client.redirect_uris.clone(),
            grant_types: client.grant_types.clone(),
            response_types: client.response_types.clone(),
            scope: client.scope.clone(),
            token_endpoint_auth_method: client.token_endpoint_auth_method,
            client_id_issued_at: client.created_at.timestamp(),
            client_secret_expires_at: client.client_secret.as_ref().map(|_| 0),
        }
    }
}

/// Generate a secure random token
pub fn generate_token() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.r#gen();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a client ID
pub fn generate_client_id() -> String {
    Uuid::new_v4().to_string()
}

/// Validate scope string
pub fn validate_scope(scope: &str) -> bool {
    scope.split_whitespace().all(|s| {
        s.chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '/'))
    })
}

/// Parse scope string into a set
pub fn parse_scope(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(|s| s.to_string()).collect()
}

/// Join scopes into a space-separated string
pub fn join_scopes(scopes: &BTreeSet<String>) -> String {
    scopes.iter().cloned().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn access_token(expires_at: DateTime<Utc>) -> AccessToken {
        AccessToken {
            token: generate_token(),
            token_type: TokenType::Bearer,
            client_id: "client".to_string(),
            scopes: BTreeSet::new(),
            resource: None,
            created_at: expires_at - Duration::hours(1),
            expires_at,
        }
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let now = Utc::now();
        let token = access_token(now);

        assert!(token.is_expired_at(now));
        assert!(token.is_expired_at(now + Duration::milliseconds(1)));
        assert!(!token.is_expired_at(now - Duration::milliseconds(1)));
    }

    #[test]
    fn test_generate_token() {
        let first = generate_token();
        let second = generate_token();

        assert_ne!(first, second);
        // 32 bytes, base64url without padding
        assert_eq!(first.len(), 43);
        assert!(!first.contains('='));
    }

    #[test]
    fn test_scope_helpers() {
        let scopes = parse_scope("write  read read");
        assert_eq!(scopes.len(), 2);
        assert_eq!(join_scopes(&scopes), "read write");
        assert_eq!(join_scopes(&BTreeSet::new()), "");

        assert!(validate_scope("mcp:tools read_only"));
        assert!(!validate_scope("read\"write"));
    }

    #[test]
    fn test_code_challenge_method() {
        assert_eq!(
            CodeChallengeMethod::parse("S256"),
            Some(CodeChallengeMethod::S256)
        );
        assert_eq!(
            CodeChallengeMethod::parse("plain"),
            Some(CodeChallengeMethod::Plain)
        );
        assert_eq!(CodeChallengeMethod::parse("s256"), None);
        assert_eq!(CodeChallengeMethod::S256.as_str(), "S256");
    }

    #[test]
    fn test_token_response_serialization() {
        let response = TokenResponse {
            access_token: "at".to_string(),
            token_type: TokenType::Bearer,
            expires_in: 3600,
            refresh_token: Some("rt".to_string()),
            scope: None,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 3600);
        assert!(json.get("scope").is_none());
    }
}
