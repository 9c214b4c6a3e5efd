//! OAuth 2.0 Dynamic Client Registration implementation (RFC 7591).
//!
//! Handles client registration requests, validation, credential generation
//! and loading of operator-provided clients.

use crate::errors::ClientRegistrationError;
use crate::oauth::resource::is_loopback;
use crate::oauth::types::*;
use crate::storage::traits::{OAuthClientStore, OAuthStorage};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

/// Client Registration Service
pub struct ClientRegistrationService {
    storage: Arc<dyn OAuthStorage>,
    /// Whether client registration is enabled
    registration_enabled: bool,
    /// Default token endpoint auth method
    default_auth_method: ClientAuthMethod,
    /// Maximum number of redirect URIs per client
    max_redirect_uris: usize,
    /// Scopes a client may register for
    supported_scopes: Vec<String>,
}

/// A client provisioned by the operator rather than by self-registration
#[derive(Debug, Clone, Deserialize)]
pub struct SeedClient {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Option<Vec<GrantType>>,
    pub scope: Option<String>,
    pub token_endpoint_auth_method: Option<ClientAuthMethod>,
}

impl ClientRegistrationService {
    /// Create a new client registration service
    pub fn new(storage: Arc<dyn OAuthStorage>, supported_scopes: Vec<String>) -> Self {
        Self {
            storage,
            registration_enabled: true,
            default_auth_method: ClientAuthMethod::ClientSecretPost,
            max_redirect_uris: 10,
            supported_scopes,
        }
    }

    /// Disable client registration
    pub fn disable_registration(mut self) -> Self {
        self.registration_enabled = false;
        self
    }

    pub fn with_max_redirect_uris(mut self, max_redirect_uris: usize) -> Self {
        self.max_redirect_uris = max_redirect_uris;
        self
    }

    pub fn registration_enabled(&self) -> bool {
        self.registration_enabled
    }

    /// Register a new OAuth client
    ///
    /// Every call creates a distinct client; there is no deduplication.
    pub async fn register_client(
        &self,
        request: ClientRegistrationRequest,
    ) -> Result<ClientRegistrationResponse, ClientRegistrationError> {
        if !self.registration_enabled {
            return Err(ClientRegistrationError::RegistrationDisabled);
        }

        let redirect_uris = self.validate_redirect_uris(request.redirect_uris.as_deref())?;
        let grant_types = validate_grant_types(request.grant_types)?;

        let response_types = request
            .response_types
            .unwrap_or_else(|| vec![ResponseType::Code]);
        if !response_types.contains(&ResponseType::Code) {
            return Err(ClientRegistrationError::InvalidClientMetadata(
                "response_types must include code".to_string(),
            ));
        }

        let scope = self.validate_registration_scope(request.scope.as_deref())?;

        let auth_method = request
            .token_endpoint_auth_method
            .unwrap_or(self.default_auth_method);
        let client_secret = match auth_method {
            ClientAuthMethod::None => None,
            _ => Some(generate_token()),
        };

        let client = OAuthClient {
            client_id: generate_client_id(),
            client_secret,
            client_name: request.client_name,
            redirect_uris,
            grant_types,
            response_types,
            scope,
            token_endpoint_auth_method: auth_method,
            created_at: Utc::now(),
            metadata: serde_json::Value::Object(request.metadata),
        };

        self.storage.store_client(&client).await?;

        tracing::info!(
            client_id = %client.client_id,
            client_name = ?client.client_name,
            auth_method = ?client.token_endpoint_auth_method,
            "client registered"
        );

        Ok(ClientRegistrationResponse::from(&client))
    }

    /// Store an operator-provided client with a fixed identifier
    pub async fn seed_client(
        &self,
        seed: SeedClient,
    ) -> Result<OAuthClient, ClientRegistrationError> {
        if seed.client_id.trim().is_empty() {
            return Err(ClientRegistrationError::InvalidClientMetadata(
                "client_id must not be empty".to_string(),
            ));
        }

        let redirect_uris = self.validate_redirect_uris(Some(&seed.redirect_uris))?;
        let grant_types = validate_grant_types(seed.grant_types)?;
        let scope = self.validate_registration_scope(seed.scope.as_deref())?;

        let auth_method = seed
            .token_endpoint_auth_method
            .unwrap_or(self.default_auth_method);
        if auth_method != ClientAuthMethod::None && seed.client_secret.is_none() {
            return Err(ClientRegistrationError::InvalidClientMetadata(format!(
                "client {} requires a client_secret",
                seed.client_id
            )));
        }

        let client = OAuthClient {
            client_id: seed.client_id,
            client_secret: seed.client_secret,
            client_name: seed.client_name,
            redirect_uris,
            grant_types,
            response_types: vec![ResponseType::Code],
            scope,
            token_endpoint_auth_method: auth_method,
            created_at: Utc::now(),
            metadata: serde_json::Value::Null,
        };

        self.storage.store_client(&client).await?;
        tracing::info!(client_id = %client.client_id, "client seeded");

        Ok(client)
    }

    /// Look up a registered client
    pub async fn get_client(
        &self,
        client_id: &str,
    ) -> Result<Option<OAuthClient>, ClientRegistrationError> {
        Ok(self.storage.get_client(client_id).await?)
    }

    fn validate_redirect_uris(
        &self,
        redirect_uris: Option<&[String]>,
    ) -> Result<Vec<String>, ClientRegistrationError> {
        let redirect_uris = redirect_uris.unwrap_or_default();
        if redirect_uris.is_empty() {
            return Err(ClientRegistrationError::InvalidRedirectUri(
                "At least one redirect URI is required".to_string(),
            ));
        }

        if redirect_uris.len() > self.max_redirect_uris {
            return Err(ClientRegistrationError::InvalidRedirectUri(format!(
                "Too many redirect URIs (max: {})",
                self.max_redirect_uris
            )));
        }

        let mut validated: Vec<String> = Vec::with_capacity(redirect_uris.len());
        for uri in redirect_uris {
            validate_redirect_uri(uri)?;
            if !validated.contains(uri) {
                validated.push(uri.clone());
            }
        }

        Ok(validated)
    }

    fn validate_registration_scope(
        &self,
        scope: Option<&str>,
    ) -> Result<Option<String>, ClientRegistrationError> {
        let Some(scope) = scope.filter(|scope| !scope.trim().is_empty()) else {
            if self.supported_scopes.is_empty() {
                return Ok(None);
            }
            return Ok(Some(self.supported_scopes.join(" ")));
        };

        if !validate_scope(scope) {
            return Err(ClientRegistrationError::InvalidClientMetadata(format!(
                "Malformed scope: {scope}"
            )));
        }

        let requested = parse_scope(scope);
        if let Some(unsupported) = requested
            .iter()
            .find(|scope| !self.supported_scopes.contains(scope))
        {
            return Err(ClientRegistrationError::InvalidClientMetadata(format!(
                "Unsupported scope: {unsupported}"
            )));
        }

        Ok(Some(join_scopes(&requested)))
    }
}

fn validate_grant_types(
    grant_types: Option<Vec<GrantType>>,
) -> Result<Vec<GrantType>, ClientRegistrationError> {
    let requested = grant_types
        .unwrap_or_else(|| vec![GrantType::AuthorizationCode, GrantType::RefreshToken]);
    let mut grant_types: Vec<GrantType> = Vec::with_capacity(requested.len());
    for grant_type in requested {
        if !grant_types.contains(&grant_type) {
            grant_types.push(grant_type);
        }
    }

    if !grant_types.contains(&GrantType::AuthorizationCode) {
        return Err(ClientRegistrationError::InvalidClientMetadata(
            "grant_types must include authorization_code".to_string(),
        ));
    }

    Ok(grant_types)
}

/// Redirect URIs must be https, or http on a loopback host, without a fragment
fn validate_redirect_uri(uri: &str) -> Result<(), ClientRegistrationError> {
    let parsed = Url::parse(uri).map_err(|e| {
        ClientRegistrationError::InvalidRedirectUri(format!("Invalid URI format: {}", e))
    })?;

    match parsed.scheme() {
        "https" => {}
        "http" => {
            let host = parsed.host_str().ok_or_else(|| {
                ClientRegistrationError::InvalidRedirectUri("Invalid redirect URI host".to_string())
            })?;
            if !is_loopback(host) {
                return Err(ClientRegistrationError::InvalidRedirectUri(
                    "HTTP redirect URIs only allowed for localhost".to_string(),
                ));
            }
        }
        _ => {
            return Err(ClientRegistrationError::InvalidRedirectUri(
                "Redirect URI must use HTTP or HTTPS".to_string(),
            ));
        }
    }

    if parsed.fragment().is_some() {
        return Err(ClientRegistrationError::InvalidRedirectUri(
            "Redirect URI must not contain fragment".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::inmemory::MemoryOAuthStorage;

    fn service() -> ClientRegistrationService {
        let storage = Arc::new(MemoryOAuthStorage::new());
        ClientRegistrationService::new(storage, vec!["a".to_string(), "b".to_string()])
    }

    fn request(redirect_uris: &[&str]) -> ClientRegistrationRequest {
        ClientRegistrationRequest {
            client_name: Some("Agent".to_string()),
            redirect_uris: Some(redirect_uris.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_client_registration_defaults() {
        let service = service();

        let response = service
            .register_client(request(&["https://cb/x"]))
            .await
            .unwrap();

        assert!(!response.client_id.is_empty());
        assert!(response.client_secret.is_some());
        assert_eq!(response.client_secret_expires_at, Some(0));
        assert_eq!(
            response.grant_types,
            vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
        );
        assert_eq!(response.response_types, vec![ResponseType::Code]);
        assert_eq!(response.redirect_uris, vec!["https://cb/x".to_string()]);
        assert_eq!(response.scope.as_deref(), Some("a b"));
        assert_eq!(
            response.token_endpoint_auth_method,
            ClientAuthMethod::ClientSecretPost
        );

        let stored = service
            .get_client(&response.client_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.client_secret, response.client_secret);
    }

    #[tokio::test]
    async fn test_each_registration_creates_new_client() {
        let service = service();

        let first = service
            .register_client(request(&["https://cb/x"]))
            .await
            .unwrap();
        let second = service
            .register_client(request(&["https://cb/x"]))
            .await
            .unwrap();

        assert_ne!(first.client_id, second.client_id);
        assert_ne!(first.client_secret, second.client_secret);
    }

    #[tokio::test]
    async fn test_public_client_has_no_secret() {
        let service = service();
        let mut request = request(&["http://localhost:3000/callback"]);
        request.token_endpoint_auth_method = Some(ClientAuthMethod::None);

        let response = service.register_client(request).await.unwrap();
        assert!(response.client_secret.is_none());
        assert!(response.client_secret_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_invalid_redirect_uris() {
        let service = service();

        for uris in [
            &[][..],
            &["http://example.com/callback"][..],
            &["https://example.com/callback#frag"][..],
            &["custom-scheme://callback"][..],
            &["not a uri"][..],
        ] {
            let result = service.register_client(request(uris)).await;
            assert!(
                matches!(result, Err(ClientRegistrationError::InvalidRedirectUri(_))),
                "expected rejection for {uris:?}"
            );
        }

        let too_many: Vec<String> = (0..11)
            .map(|i| format!("https://example.com/cb/{i}"))
            .collect();
        let refs: Vec<&str> = too_many.iter().map(String::as_str).collect();
        let result = service.register_client(request(&refs)).await;
        assert!(matches!(
            result,
            Err(ClientRegistrationError::InvalidRedirectUri(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_redirect_uris_collapse() {
        let service = service();
        let response = service
            .register_client(request(&["https://cb/x", "https://cb/x", "https://cb/y"]))
            .await
            .unwrap();
        assert_eq!(response.redirect_uris, vec!["https://cb/x", "https://cb/y"]);
    }

    #[tokio::test]
    async fn test_invalid_metadata() {
        let service = service();

        let mut no_code_grant = request(&["https://cb/x"]);
        no_code_grant.grant_types = Some(vec![GrantType::RefreshToken]);
        assert!(matches!(
            service.register_client(no_code_grant).await,
            Err(ClientRegistrationError::InvalidClientMetadata(_))
        ));

        let mut unsupported_scope = request(&["https://cb/x"]);
        unsupported_scope.scope = Some("a admin".to_string());
        assert!(matches!(
            service.register_client(unsupported_scope).await,
            Err(ClientRegistrationError::InvalidClientMetadata(_))
        ));

        let mut no_code_response = request(&["https://cb/x"]);
        no_code_response.response_types = Some(vec![]);
        assert!(matches!(
            service.register_client(no_code_response).await,
            Err(ClientRegistrationError::InvalidClientMetadata(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_registration() {
        let service = service().disable_registration();
        assert!(!service.registration_enabled());

        let result = service.register_client(request(&["https://cb/x"])).await;
        assert!(matches!(
            result,
            Err(ClientRegistrationError::RegistrationDisabled)
        ));
    }

    #[tokio::test]
    async fn test_seed_client() {
        let service = service().disable_registration();

        let seeded = service
            .seed_client(SeedClient {
                client_id: "ops-agent".to_string(),
                client_secret: Some("ops-secret".to_string()),
                client_name: None,
                redirect_uris: vec!["https://ops.example.com/cb".to_string()],
                grant_types: None,
                scope: Some("b".to_string()),
                token_endpoint_auth_method: None,
            })
            .await
            .unwrap();
        assert_eq!(seeded.scope.as_deref(), Some("b"));

        let found = service.get_client("ops-agent").await.unwrap().unwrap();
        assert_eq!(found.client_secret.as_deref(), Some("ops-secret"));

        let missing_secret = service
            .seed_client(SeedClient {
                client_id: "no-secret".to_string(),
                client_secret: None,
                client_name: None,
                redirect_uris: vec!["https://ops.example.com/cb".to_string()],
                grant_types: None,
                scope: None,
                token_endpoint_auth_method: Some(ClientAuthMethod::ClientSecretBasic),
            })
            .await;
        assert!(matches!(
            missing_secret,
            Err(ClientRegistrationError::InvalidClientMetadata(_))
        ));
    }
}
