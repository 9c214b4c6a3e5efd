//! Standardized error types following the `error-toolgate-<domain>-<number>` format.

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use thiserror::Error;

use crate::oauth::types::OAuthErrorResponse;

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a required environment variable is not set
    #[error("error-toolgate-config-1 {0} must be set")]
    EnvVarRequired(String),

    /// Error when PORT cannot be parsed
    #[error("error-toolgate-config-2 Parsing PORT into u16 failed: {0:?}")]
    PortParsingFailed(std::num::ParseIntError),

    /// Error when version information is not available
    #[error("error-toolgate-config-3 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when duration string cannot be parsed
    #[error("error-toolgate-config-4 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when boolean string cannot be parsed
    #[error(
        "error-toolgate-config-5 Failed to parse boolean '{0}': expected true/false/1/0/yes/no/on/off"
    )]
    BoolParsingFailed(String),

    /// Error when a URL setting is not a usable absolute URL
    #[error("error-toolgate-config-6 Invalid URL for {0}: {1}")]
    InvalidUrl(String, String),

    /// Error when a configured scope is malformed
    #[error("error-toolgate-config-7 Invalid scope: {0}")]
    InvalidScope(String),

    /// Error when a numeric setting cannot be parsed
    #[error("error-toolgate-config-8 Failed to parse number for {0}: {1:?}")]
    NumberParsingFailed(String, std::num::ParseIntError),

    /// Error when the pre-seeded clients file cannot be loaded
    #[error("error-toolgate-config-9 Unable to load clients file '{0}': {1}")]
    ClientsFileFailed(String, String),
}

/// OAuth-related errors
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Unknown client or failed client authentication
    #[error("error-toolgate-oauth-1 Invalid client: {0}")]
    InvalidClient(String),

    /// Expired, consumed or mismatched code or refresh token
    #[error("error-toolgate-oauth-2 Invalid grant: {0}")]
    InvalidGrant(String),

    /// Unsupported grant type
    #[error("error-toolgate-oauth-3 Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Invalid scope
    #[error("error-toolgate-oauth-4 Invalid scope: {0}")]
    InvalidScope(String),

    /// Invalid request
    #[error("error-toolgate-oauth-5 Invalid request: {0}")]
    InvalidRequest(String),

    /// Unauthorized client
    #[error("error-toolgate-oauth-6 Unauthorized client: {0}")]
    UnauthorizedClient(String),

    /// Unsupported response type
    #[error("error-toolgate-oauth-7 Unsupported response type: {0}")]
    UnsupportedResponseType(String),

    /// Unknown or expired access token
    #[error("error-toolgate-oauth-8 Invalid token: {0}")]
    InvalidToken(String),

    /// Access token lacks a scope the resource requires
    #[error("error-toolgate-oauth-9 Insufficient scope: {0}")]
    InsufficientScope(String),

    /// Server error
    #[error("error-toolgate-oauth-10 Server error: {0}")]
    ServerError(String),
}

impl OAuthError {
    /// The OAuth error code sent on the wire.
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidClient(_) => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::UnauthorizedClient(_) => "unauthorized_client",
            OAuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            OAuthError::InvalidToken(_) => "invalid_token",
            OAuthError::InsufficientScope(_) => "insufficient_scope",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OAuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            OAuthError::InsufficientScope(_) => StatusCode::FORBIDDEN,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Body sent to the client for this error.
    pub fn to_response_body(&self) -> OAuthErrorResponse {
        OAuthErrorResponse {
            error: self.error_code().to_string(),
            error_description: Some(self.to_string()),
        }
    }
}

impl From<StorageError> for OAuthError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = ?err, "storage failure");
        OAuthError::ServerError(err.to_string())
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_response_body())).into_response()
    }
}

/// Client registration errors
#[derive(Debug, Error)]
pub enum ClientRegistrationError {
    /// Invalid client metadata
    #[error("error-toolgate-client-1 Invalid client metadata: {0}")]
    InvalidClientMetadata(String),

    /// Invalid redirect URI
    #[error("error-toolgate-client-2 Invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    /// Client registration disabled
    #[error("error-toolgate-client-3 Client registration disabled")]
    RegistrationDisabled,

    /// Storage failure while persisting the client
    #[error("error-toolgate-client-4 Unable to store client: {0}")]
    Storage(#[from] StorageError),
}

impl ClientRegistrationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ClientRegistrationError::InvalidClientMetadata(_) => "invalid_client_metadata",
            ClientRegistrationError::InvalidRedirectUri(_) => "invalid_redirect_uri",
            ClientRegistrationError::RegistrationDisabled => "registration_not_supported",
            ClientRegistrationError::Storage(_) => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ClientRegistrationError::RegistrationDisabled => StatusCode::FORBIDDEN,
            ClientRegistrationError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ClientRegistrationError {
    fn into_response(self) -> Response {
        if let ClientRegistrationError::Storage(ref err) = self {
            tracing::error!(error = ?err, "client registration storage failure");
        }
        let body = OAuthErrorResponse {
            error: self.error_code().to_string(),
            error_description: Some(self.to_string()),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// A store's lock was poisoned by a panicking holder
    #[error("error-toolgate-storage-1 Lock error: {0}")]
    LockFailed(String),

    /// Error when a record with the same key already exists
    #[error("error-toolgate-storage-2 Duplicate key: {0}")]
    DuplicateKey(String),
}
