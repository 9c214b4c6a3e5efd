//! Core OAuth 2.1 authorization server handling authorization, token, PKCE and revocation flows.

use crate::errors::OAuthError;
use crate::oauth::resource::ResourcePolicy;
use crate::oauth::types::*;
use crate::storage::traits::{
    AccessTokenStore, AuthorizationCodeStore, Consumed, Inspection, OAuthClientStore, OAuthStorage,
    RefreshTokenStore,
};
use axum::http::HeaderMap;
use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use url::Url;

/// Lifetimes applied to newly minted codes and tokens
#[derive(Clone, Debug)]
pub struct TokenLifetimes {
    pub authorization_code: Duration,
    pub access_token: Duration,
    pub refresh_token: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            authorization_code: Duration::minutes(5),
            access_token: Duration::seconds(3600),
            refresh_token: Duration::seconds(86400),
        }
    }
}

/// OAuth 2.1 Authorization Server
pub struct AuthorizationServer {
    pub storage: Arc<dyn OAuthStorage>,
    /// Server issuer URL (external base)
    issuer: String,
    resource_policy: ResourcePolicy,
    lifetimes: TokenLifetimes,
}

impl AuthorizationServer {
    /// Create a new authorization server
    pub fn new(
        storage: Arc<dyn OAuthStorage>,
        issuer: String,
        resource_policy: ResourcePolicy,
    ) -> Self {
        Self {
            storage,
            issuer,
            resource_policy,
            lifetimes: TokenLifetimes::default(),
        }
    }

    pub fn with_lifetimes(mut self, lifetimes: TokenLifetimes) -> Self {
        self.lifetimes = lifetimes;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn resource_policy(&self) -> &ResourcePolicy {
        &self.resource_policy
    }

    /// Handle authorization requests (RFC 6749 Section 4.1.1)
    ///
    /// Authorization is granted without a consent step once the client,
    /// redirect URI and resource validate.
    pub async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<AuthorizeResponse, OAuthError> {
        let client = self
            .storage
            .get_client(&request.client_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidClient("Client not found".to_string()))?;

        // Never redirect anywhere before this check passes
        if !client.has_redirect_uri(&request.redirect_uri) {
            return Err(OAuthError::InvalidRequest(
                "Invalid redirect URI".to_string(),
            ));
        }

        let resource = self
            .resource_policy
            .resolve_requested(request.resource.as_deref())?;

        if !client.allows_grant(GrantType::AuthorizationCode) {
            return Err(OAuthError::UnauthorizedClient(
                "Client may not use the authorization_code grant".to_string(),
            ));
        }

        match request.response_type.as_deref() {
            Some("code") => {}
            Some(other) => return Err(OAuthError::UnsupportedResponseType(other.to_string())),
            None => {
                return Err(OAuthError::InvalidRequest(
                    "Missing response_type".to_string(),
                ));
            }
        }

        let code_challenge = request
            .code_challenge
            .filter(|challenge| !challenge.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("Missing code_challenge".to_string()))?;
        let code_challenge_method = request
            .code_challenge_method
            .as_deref()
            .ok_or_else(|| {
                OAuthError::InvalidRequest("Missing code_challenge_method".to_string())
            })
            .and_then(|method| {
                CodeChallengeMethod::parse(method).ok_or_else(|| {
                    OAuthError::InvalidRequest(format!("Unsupported PKCE method: {method}"))
                })
            })?;

        let scopes = resolve_authorization_scopes(&client, request.scope.as_deref())?;

        let now = Utc::now();
        let code = generate_token();
        let auth_code = AuthorizationCode {
            code: code.clone(),
            client_id: client.client_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            scopes,
            code_challenge,
            code_challenge_method,
            resource,
            created_at: now,
            expires_at: now + self.lifetimes.authorization_code,
        };
        self.storage.store_code(&auth_code).await?;

        let mut redirect_url = Url::parse(&request.redirect_uri).map_err(|e| {
            OAuthError::InvalidRequest(format!("Invalid redirect URI: {e}"))
        })?;
        redirect_url.query_pairs_mut().append_pair("code", &code);
        if let Some(state) = &request.state {
            redirect_url.query_pairs_mut().append_pair("state", state);
        }

        tracing::info!(
            client_id = %client.client_id,
            scopes = %join_scopes(&auth_code.scopes),
            resource = ?auth_code.resource,
            "authorization code issued"
        );

        Ok(AuthorizeResponse {
            redirect_url: redirect_url.to_string(),
            code,
        })
    }

    /// Handle token requests (RFC 6749 Section 4.1.3 and Section 6)
    pub async fn token(
        &self,
        request: TokenRequest,
        client_auth: Option<ClientAuthentication>,
    ) -> Result<TokenResponse, OAuthError> {
        let client = self.authenticate_client(client_auth).await?;

        if !client.allows_grant(request.grant_type) {
            return Err(OAuthError::UnauthorizedClient(format!(
                "Client may not use the {} grant",
                request.grant_type.as_str()
            )));
        }

        let result = match request.grant_type {
            GrantType::AuthorizationCode => {
                self.handle_authorization_code_grant(request, &client).await
            }
            GrantType::RefreshToken => self.handle_refresh_token_grant(request, &client).await,
        };

        if let Err(ref err) = result {
            tracing::warn!(client_id = %client.client_id, error = %err, "token request rejected");
        }
        result
    }

    /// Handle authorization code grant
    async fn handle_authorization_code_grant(
        &self,
        request: TokenRequest,
        client: &OAuthClient,
    ) -> Result<TokenResponse, OAuthError> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("Missing authorization code".to_string()))?;
        let code_verifier = request
            .code_verifier
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("Missing code verifier".to_string()))?;
        let requested_resource = self
            .resource_policy
            .resolve_requested(request.resource.as_deref())?;
        let redirect_uri = request.redirect_uri.as_deref();
        let now = Utc::now();

        let inspect = |auth_code: &AuthorizationCode| {
            inspect_authorization_code(
                auth_code,
                &client.client_id,
                redirect_uri,
                code_verifier,
                requested_resource.as_deref(),
                now,
            )
        };

        let auth_code = match self.storage.consume_code(code, &inspect).await? {
            Consumed::Taken(auth_code) => auth_code,
            Consumed::Rejected(err) => return Err(err),
            Consumed::Missing => {
                return Err(OAuthError::InvalidGrant(
                    "Invalid authorization code".to_string(),
                ));
            }
        };

        let resource = auth_code.resource.or(requested_resource);
        self.issue_tokens(&client.client_id, auth_code.scopes, resource, now)
            .await
    }

    /// Handle refresh token grant with rotation
    async fn handle_refresh_token_grant(
        &self,
        request: TokenRequest,
        client: &OAuthClient,
    ) -> Result<TokenResponse, OAuthError> {
        let refresh_token = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("Missing refresh token".to_string()))?;
        let requested_scopes = request
            .scope
            .as_deref()
            .map(parse_scope)
            .filter(|scopes| !scopes.is_empty());
        let requested_resource = self
            .resource_policy
            .resolve_requested(request.resource.as_deref())?;
        let now = Utc::now();

        let inspect = |record: &RefreshToken| {
            inspect_refresh_token(
                record,
                &client.client_id,
                requested_scopes.as_ref(),
                requested_resource.as_deref(),
                now,
            )
        };

        let record = match self
            .storage
            .consume_refresh_token(refresh_token, &inspect)
            .await?
        {
            Consumed::Taken(record) => record,
            Consumed::Rejected(err) => return Err(err),
            Consumed::Missing => {
                return Err(OAuthError::InvalidGrant("Invalid refresh token".to_string()));
            }
        };

        let scopes = requested_scopes.unwrap_or(record.scopes);
        let resource = record.resource.or(requested_resource);
        self.issue_tokens(&client.client_id, scopes, resource, now)
            .await
    }

    /// Mint and persist an access/refresh token pair
    async fn issue_tokens(
        &self,
        client_id: &str,
        scopes: BTreeSet<String>,
        resource: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, OAuthError> {
        let access_token = AccessToken {
            token: generate_token(),
            token_type: TokenType::Bearer,
            client_id: client_id.to_string(),
            scopes: scopes.clone(),
            resource: resource.clone(),
            created_at: now,
            expires_at: now + self.lifetimes.access_token,
        };
        self.storage.store_token(&access_token).await?;

        let refresh_token = RefreshToken {
            token: generate_token(),
            access_token: access_token.token.clone(),
            client_id: client_id.to_string(),
            scopes,
            resource,
            created_at: now,
            expires_at: now + self.lifetimes.refresh_token,
        };
        self.storage.store_refresh_token(&refresh_token).await?;

        tracing::info!(
            client_id = %client_id,
            scopes = %join_scopes(&access_token.scopes),
            resource = ?access_token.resource,
            "token pair issued"
        );

        let scope = Some(join_scopes(&access_token.scopes)).filter(|scope| !scope.is_empty());
        Ok(TokenResponse {
            access_token: access_token.token,
            token_type: TokenType::Bearer,
            expires_in: self.lifetimes.access_token.num_seconds().max(0) as u64,
            refresh_token: Some(refresh_token.token),
            scope,
        })
    }

    /// Revoke a token (RFC 7009)
    ///
    /// Both stores are checked since the caller may hold either kind. Revoking
    /// a refresh token also revokes the access token issued alongside it.
    /// Unknown tokens are not an error. Returns whether anything was removed.
    pub async fn revoke(&self, token: &str) -> Result<bool, OAuthError> {
        let access_revoked = self.storage.revoke_token(token).await?;
        let refresh_revoked = match self.storage.revoke_refresh_token(token).await? {
            Some(record) => {
                self.storage.revoke_token(&record.access_token).await?;
                true
            }
            None => false,
        };

        let revoked = access_revoked || refresh_revoked;
        tracing::debug!(revoked, "token revocation");
        Ok(revoked)
    }

    /// Authenticate a client at the token endpoint
    async fn authenticate_client(
        &self,
        client_auth: Option<ClientAuthentication>,
    ) -> Result<OAuthClient, OAuthError> {
        let client_auth = client_auth
            .ok_or_else(|| OAuthError::InvalidClient("Missing client credentials".to_string()))?;

        let client = self
            .storage
            .get_client(&client_auth.client_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidClient("Client not found".to_string()))?;

        match client.token_endpoint_auth_method {
            ClientAuthMethod::None => Ok(client),
            ClientAuthMethod::ClientSecretBasic | ClientAuthMethod::ClientSecretPost => {
                let provided_secret = client_auth.client_secret.as_deref().ok_or_else(|| {
                    OAuthError::InvalidClient("Missing client secret".to_string())
                })?;

                let expected_secret = client.client_secret.as_deref().ok_or_else(|| {
                    OAuthError::InvalidClient("Client has no secret configured".to_string())
                })?;

                if !bool::from(provided_secret.as_bytes().ct_eq(expected_secret.as_bytes())) {
                    return Err(OAuthError::InvalidClient(
                        "Invalid client secret".to_string(),
                    ));
                }

                Ok(client)
            }
        }
    }
}

fn resolve_authorization_scopes(
    client: &OAuthClient,
    requested: Option<&str>,
) -> Result<BTreeSet<String>, OAuthError> {
    let allowed = client.scope.as_deref().map(parse_scope);

    let Some(requested) = requested.filter(|scope| !scope.trim().is_empty()) else {
        return Ok(allowed.unwrap_or_default());
    };

    if !validate_scope(requested) {
        return Err(OAuthError::InvalidScope(format!(
            "Malformed scope: {requested}"
        )));
    }

    let requested = parse_scope(requested);
    if let Some(allowed) = &allowed {
        if !requested.is_subset(allowed) {
            return Err(OAuthError::InvalidScope(format!(
                "Requested scope exceeds client registration: {}",
                join_scopes(&requested)
            )));
        }
    }

    Ok(requested)
}

/// Checks run against a stored authorization code before it is consumed.
///
/// An expired code is evicted. Any other failure leaves it in place.
fn inspect_authorization_code(
    auth_code: &AuthorizationCode,
    client_id: &str,
    redirect_uri: Option<&str>,
    code_verifier: &str,
    requested_resource: Option<&str>,
    now: DateTime<Utc>,
) -> Inspection {
    if auth_code.is_expired_at(now) {
        return Inspection::Evict(OAuthError::InvalidGrant(
            "Authorization code expired".to_string(),
        ));
    }

    if auth_code.client_id != client_id {
        return Inspection::Reject(OAuthError::InvalidGrant(
            "Authorization code was issued to another client".to_string(),
        ));
    }

    if redirect_uri.is_some_and(|uri| uri != auth_code.redirect_uri) {
        return Inspection::Reject(OAuthError::InvalidGrant(
            "Redirect URI mismatch".to_string(),
        ));
    }

    if !verify_pkce(
        code_verifier,
        &auth_code.code_challenge,
        auth_code.code_challenge_method,
    ) {
        return Inspection::Reject(OAuthError::InvalidGrant(
            "PKCE verification failed".to_string(),
        ));
    }

    if !resource_agrees(requested_resource, auth_code.resource.as_deref()) {
        return Inspection::Reject(OAuthError::InvalidGrant(
            "Resource does not match the authorization request".to_string(),
        ));
    }

    Inspection::Accept
}

/// A token-endpoint `resource` must equal a bound grant's resource. Unbound
/// grants take the requested resource as their binding.
fn resource_agrees(requested: Option<&str>, bound: Option<&str>) -> bool {
    match (requested, bound) {
        (Some(requested), Some(bound)) => requested == bound,
        _ => true,
    }
}

/// Checks run against a stored refresh token before it is rotated.
fn inspect_refresh_token(
    record: &RefreshToken,
    client_id: &str,
    requested_scopes: Option<&BTreeSet<String>>,
    requested_resource: Option<&str>,
    now: DateTime<Utc>,
) -> Inspection {
    if record.client_id != client_id {
        return Inspection::Reject(OAuthError::InvalidGrant(
            "Refresh token was issued to another client".to_string(),
        ));
    }

    if record.is_expired_at(now) {
        return Inspection::Evict(OAuthError::InvalidGrant(
            "Refresh token expired".to_string(),
        ));
    }

    if requested_scopes.is_some_and(|scopes| !scopes.is_subset(&record.scopes)) {
        return Inspection::Reject(OAuthError::InvalidGrant(
            "Requested scope exceeds the original grant".to_string(),
        ));
    }

    if !resource_agrees(requested_resource, record.resource.as_deref()) {
        return Inspection::Reject(OAuthError::InvalidGrant(
            "Resource does not match the original grant".to_string(),
        ));
    }

    Inspection::Accept
}

/// Verify a PKCE code verifier against the stored challenge (RFC 7636)
pub fn verify_pkce(
    code_verifier: &str,
    code_challenge: &str,
    method: CodeChallengeMethod,
) -> bool {
    let computed_challenge = match method {
        CodeChallengeMethod::Plain => code_verifier.to_string(),
        CodeChallengeMethod::S256 => {
            let mut hasher = Sha256::new();
            hasher.update(code_verifier.as_bytes());
            BASE64_URL_SAFE_NO_PAD.encode(hasher.finalize())
        }
    };

    computed_challenge
        .as_bytes()
        .ct_eq(code_challenge.as_bytes())
        .into()
}

/// Client Authentication extracted from request
#[derive(Clone)]
pub struct ClientAuthentication {
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Successful authorization: where to send the user agent
#[derive(Debug)]
pub struct AuthorizeResponse {
    pub redirect_url: String,
    pub code: String,
}

/// Query parameters for authorization endpoint
#[derive(Deserialize)]
#[cfg_attr(any(debug_assertions, test), derive(Debug))]
pub struct AuthorizeQuery {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub resource: Option<String>,
}

impl TryFrom<AuthorizeQuery> for AuthorizationRequest {
    type Error = OAuthError;

    fn try_from(query: AuthorizeQuery) -> Result<Self, Self::Error> {
        let client_id = query
            .client_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("Missing client_id".to_string()))?;
        let redirect_uri = query
            .redirect_uri
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("Missing redirect_uri".to_string()))?;

        Ok(Self {
            response_type: query.response_type,
            client_id,
            redirect_uri,
            scope: query.scope,
            state: query.state,
            code_challenge: query.code_challenge,
            code_challenge_method: query.code_challenge_method,
            resource: query.resource,
        })
    }
}

/// Form data for token endpoint
#[derive(Debug, Default, Deserialize)]
pub struct TokenForm {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    pub resource: Option<String>,
}

impl TryFrom<TokenForm> for TokenRequest {
    type Error = OAuthError;

    fn try_from(form: TokenForm) -> Result<Self, Self::Error> {
        let grant_type = match form.grant_type.as_deref() {
            Some("authorization_code") => GrantType::AuthorizationCode,
            Some("refresh_token") => GrantType::RefreshToken,
            Some(other) => return Err(OAuthError::UnsupportedGrantType(other.to_string())),
            None => return Err(OAuthError::InvalidRequest("Missing grant_type".to_string())),
        };

        Ok(Self {
            grant_type,
            code: form.code,
            redirect_uri: form.redirect_uri,
            code_verifier: form.code_verifier,
            refresh_token: form.refresh_token,
            scope: form.scope,
            resource: form.resource,
        })
    }
}

/// Extract client authentication from the Authorization header or form fields
pub fn extract_client_auth(
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> Option<ClientAuthentication> {
    if let Some(credentials) = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| BASE64_STANDARD.decode(encoded.trim()).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
    {
        if let Some((client_id, client_secret)) = credentials.split_once(':') {
            if let (Some(client_id), Some(client_secret)) =
                (form_decode(client_id), form_decode(client_secret))
            {
                return Some(ClientAuthentication {
                    client_id,
                    client_secret: Some(client_secret),
                });
            }
        }
    }

    form_client_id
        .filter(|id| !id.is_empty())
        .map(|client_id| ClientAuthentication {
            client_id: client_id.to_string(),
            client_secret: form_client_secret.map(|secret| secret.to_string()),
        })
}

/// Basic credentials are form-urlencoded before base64 (RFC 6749 Section 2.3.1)
fn form_decode(value: &str) -> Option<String> {
    urlencoding::decode(&value.replace('+', " "))
        .ok()
        .map(|decoded| decoded.into_owned())
}
