//! OAuth 2.1 resource server implementation.
//!
//! Verifies bearer access tokens for the protected resource and builds the
//! `WWW-Authenticate` challenges sent back when verification fails.

use crate::errors::OAuthError;
use crate::oauth::resource::ResourcePolicy;
use crate::oauth::types::*;
use crate::storage::traits::{AccessTokenStore, OAuthStorage};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Identity attached to a request that presented a valid access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub client_id: String,
    pub scopes: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
    pub resource: Option<String>,
}

/// OAuth Resource Server for protecting APIs
pub struct ResourceServer {
    storage: Arc<dyn OAuthStorage>,
    resource_policy: ResourcePolicy,
    /// Where clients discover how to obtain a token for this resource
    resource_metadata_url: String,
    /// Scopes every request must carry
    required_scopes: BTreeSet<String>,
}

impl ResourceServer {
    /// Create a new resource server
    pub fn new(
        storage: Arc<dyn OAuthStorage>,
        resource_policy: ResourcePolicy,
        resource_metadata_url: String,
    ) -> Self {
        Self {
            storage,
            resource_policy,
            resource_metadata_url,
            required_scopes: BTreeSet::new(),
        }
    }

    pub fn with_required_scopes(mut self, scopes: BTreeSet<String>) -> Self {
        self.required_scopes = scopes;
        self
    }

    pub fn resource_policy(&self) -> &ResourcePolicy {
        &self.resource_policy
    }

    /// Verify an access token.
    ///
    /// Unknown and expired tokens fail alike; the store evicts expired records
    /// as they are read. In strict mode the token must be bound to this resource.
    pub async fn verify(&self, token: &str) -> Result<AuthInfo, OAuthError> {
        let access_token = self.storage.get_token(token).await?.ok_or_else(|| {
            OAuthError::InvalidToken("Access token is unknown or expired".to_string())
        })?;

        if access_token.is_expired_at(Utc::now()) {
            return Err(OAuthError::InvalidToken("Access token expired".to_string()));
        }

        if !self
            .resource_policy
            .accepts_bound(access_token.resource.as_deref())
        {
            tracing::warn!(
                client_id = %access_token.client_id,
                bound = ?access_token.resource,
                expected = %self.resource_policy.canonical(),
                "access token bound to another resource"
            );
            return Err(OAuthError::InvalidToken(
                "Access token is not valid for this resource".to_string(),
            ));
        }

        Ok(AuthInfo {
            client_id: access_token.client_id,
            scopes: access_token.scopes,
            expires_at: access_token.expires_at,
            resource: access_token.resource,
        })
    }

    /// Verify the token and check it carries every required scope
    pub async fn authorize(&self, token: &str) -> Result<AuthInfo, OAuthError> {
        let auth_info = self.verify(token).await?;

        if !self.required_scopes.is_subset(&auth_info.scopes) {
            return Err(OAuthError::InsufficientScope(format!(
                "Required scope: {}",
                join_scopes(&self.required_scopes)
            )));
        }

        Ok(auth_info)
    }

    /// Build the `WWW-Authenticate` value for a failed request.
    ///
    /// With no error, the challenge only points at the resource metadata, as
    /// for a request that presented no credentials at all.
    pub fn www_authenticate(&self, error: Option<&OAuthError>) -> String {
        let mut challenge = WwwAuthenticate::new(&self.resource_metadata_url);

        if let Some(error) = error {
            challenge = challenge.with_error(error.error_code(), &error.to_string());
            if matches!(error, OAuthError::InsufficientScope(_)) {
                challenge = challenge.with_scope(&join_scopes(&self.required_scopes));
            }
        }

        challenge.build()
    }
}

/// Builder for RFC 6750 / RFC 9728 bearer challenges
#[derive(Debug, Clone)]
pub struct WwwAuthenticate {
    resource_metadata: String,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl WwwAuthenticate {
    pub fn new(resource_metadata: &str) -> Self {
        Self {
            resource_metadata: resource_metadata.to_string(),
            scope: None,
            error: None,
            error_description: None,
        }
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }

    pub fn with_error(mut self, error: &str, description: &str) -> Self {
        self.error = Some(error.to_string());
        self.error_description = Some(description.to_string());
        self
    }

    pub fn build(self) -> String {
        let mut parts = vec![format!(
            "Bearer resource_metadata=\"{}\"",
            quoted(&self.resource_metadata)
        )];

        if let Some(error) = self.error {
            parts.push(format!("error=\"{}\"", quoted(&error)));
        }
        if let Some(description) = self.error_description {
            parts.push(format!("error_description=\"{}\"", quoted(&description)));
        }
        if let Some(scope) = self.scope {
            parts.push(format!("scope=\"{}\"", quoted(&scope)));
        }

        parts.join(", ")
    }
}

// Header values are quoted-strings; drop anything that would end the quote early.
fn quoted(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect()
}

/// Extract a bearer token from the Authorization header
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    let value = headers
        .get(http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}
