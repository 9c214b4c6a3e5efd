//! Storage trait definitions for OAuth data.
//!
//! Codes and refresh tokens are single-use. Their stores expose
//! consume operations that take an inspection callback: the callback runs
//! while the store holds its lock, and the record is removed in the same
//! critical section only when the callback says so. Two concurrent consumers
//! of one record therefore can never both succeed.

use crate::errors::{OAuthError, StorageError};
use crate::oauth::types::*;
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Decision returned by an inspection callback.
#[derive(Debug)]
pub enum Inspection {
    /// Remove the record and hand it to the caller.
    Accept,
    /// Leave the record in place and fail with the error.
    Reject(OAuthError),
    /// Remove the record and fail with the error.
    Evict(OAuthError),
}

/// Outcome of a consume operation.
#[derive(Debug)]
pub enum Consumed<T> {
    /// The record passed inspection and is no longer stored.
    Taken(T),
    /// The record failed inspection.
    Rejected(OAuthError),
    /// No record exists under the key.
    Missing,
}

/// Callback run against a stored record under the store's lock.
pub type Inspector<'a, T> = dyn Fn(&T) -> Inspection + Send + Sync + 'a;

/// Trait for storing and retrieving OAuth clients
#[async_trait]
pub trait OAuthClientStore {
    /// Store a new OAuth client
    async fn store_client(&self, client: &OAuthClient) -> Result<()>;

    /// Retrieve a client by ID
    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>>;
}

/// Trait for storing and consuming authorization codes
#[async_trait]
pub trait AuthorizationCodeStore {
    /// Store a new authorization code
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()>;

    /// Inspect and, if accepted, remove an authorization code
    async fn consume_code(
        &self,
        code: &str,
        inspect: &Inspector<'_, AuthorizationCode>,
    ) -> Result<Consumed<AuthorizationCode>>;

    /// Clean up expired codes
    async fn cleanup_expired_codes(&self) -> Result<usize>;
}

/// Trait for storing and retrieving access tokens
#[async_trait]
pub trait AccessTokenStore {
    /// Store a new access token
    async fn store_token(&self, token: &AccessToken) -> Result<()>;

    /// Retrieve a live access token. Expired tokens are evicted and reported absent.
    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>>;

    /// Revoke a token, returning whether it existed
    async fn revoke_token(&self, token: &str) -> Result<bool>;

    /// Clean up expired tokens
    async fn cleanup_expired_tokens(&self) -> Result<usize>;
}

/// Trait for storing and consuming refresh tokens
#[async_trait]
pub trait RefreshTokenStore {
    /// Store a new refresh token
    async fn store_refresh_token(&self, token: &RefreshToken) -> Result<()>;

    /// Inspect and, if accepted, remove a refresh token
    async fn consume_refresh_token(
        &self,
        token: &str,
        inspect: &Inspector<'_, RefreshToken>,
    ) -> Result<Consumed<RefreshToken>>;

    /// Revoke a refresh token, returning the removed record
    async fn revoke_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>>;

    /// Clean up expired refresh tokens
    async fn cleanup_expired_refresh_tokens(&self) -> Result<usize>;
}

/// Combined storage trait for all OAuth entities
pub trait OAuthStorage:
    OAuthClientStore + AuthorizationCodeStore + AccessTokenStore + RefreshTokenStore + Send + Sync
{
}

impl<T> OAuthStorage for T where
    T: OAuthClientStore
        + AuthorizationCodeStore
        + AccessTokenStore
        + RefreshTokenStore
        + Send
        + Sync
{
}
