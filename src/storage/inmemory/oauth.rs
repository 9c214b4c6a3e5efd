//! In-memory OAuth storage implementation
//!
//! Every map sits behind its own `std::sync::Mutex`. No lock is held across an
//! await point, so each trait method is a single critical section.

use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard};

/// In-memory implementation for OAuth storage
#[derive(Default)]
pub struct MemoryOAuthStorage {
    clients: Mutex<HashMap<String, OAuthClient>>,
    auth_codes: Mutex<HashMap<String, AuthorizationCode>>,
    access_tokens: Mutex<HashMap<String, AccessToken>>,
    refresh_tokens: Mutex<HashMap<String, RefreshToken>>,
}

impl MemoryOAuthStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| StorageError::LockFailed(e.to_string()))
}

fn insert_new<T: Clone>(map: &mut HashMap<String, T>, key: &str, value: &T) -> Result<()> {
    match map.entry(key.to_string()) {
        Entry::Occupied(_) => Err(StorageError::DuplicateKey(key.to_string())),
        Entry::Vacant(slot) => {
            slot.insert(value.clone());
            Ok(())
        }
    }
}

fn consume<T>(
    map: &mut HashMap<String, T>,
    key: &str,
    inspect: &Inspector<'_, T>,
) -> Consumed<T> {
    let decision = match map.get(key) {
        None => return Consumed::Missing,
        Some(record) => inspect(record),
    };

    match decision {
        Inspection::Accept => match map.remove(key) {
            Some(record) => Consumed::Taken(record),
            None => Consumed::Missing,
        },
        Inspection::Reject(err) => Consumed::Rejected(err),
        Inspection::Evict(err) => {
            map.remove(key);
            Consumed::Rejected(err)
        }
    }
}

fn purge_expired<T: Expires>(map: &mut HashMap<String, T>, now: DateTime<Utc>) -> usize {
    let before = map.len();
    map.retain(|_, record| !record.is_expired_at(now));
    before - map.len()
}

#[async_trait]
impl OAuthClientStore for MemoryOAuthStorage {
    async fn store_client(&self, client: &OAuthClient) -> Result<()> {
        let mut clients = lock(&self.clients)?;
        insert_new(&mut clients, &client.client_id, client)
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>> {
        let clients = lock(&self.clients)?;
        Ok(clients.get(client_id).cloned())
    }
}

#[async_trait]
impl AuthorizationCodeStore for MemoryOAuthStorage {
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()> {
        let mut codes = lock(&self.auth_codes)?;
        insert_new(&mut codes, &code.code, code)
    }

    async fn consume_code(
        &self,
        code: &str,
        inspect: &Inspector<'_, AuthorizationCode>,
    ) -> Result<Consumed<AuthorizationCode>> {
        let mut codes = lock(&self.auth_codes)?;
        Ok(consume(&mut codes, code, inspect))
    }

    async fn cleanup_expired_codes(&self) -> Result<usize> {
        let mut codes = lock(&self.auth_codes)?;
        Ok(purge_expired(&mut codes, Utc::now()))
    }
}

#[async_trait]
impl AccessTokenStore for MemoryOAuthStorage {
    async fn store_token(&self, token: &AccessToken) -> Result<()> {
        let mut tokens = lock(&self.access_tokens)?;
        insert_new(&mut tokens, &token.token, token)
    }

    async fn get_token(&self, token: &str) -> Result<Option<AccessToken>> {
        let mut tokens = lock(&self.access_tokens)?;
        match tokens.get(token) {
            Some(access_token) if access_token.is_expired_at(Utc::now()) => {
                tokens.remove(token);
                Ok(None)
            }
            found => Ok(found.cloned()),
        }
    }

    async fn revoke_token(&self, token: &str) -> Result<bool> {
        let mut tokens = lock(&self.access_tokens)?;
        Ok(tokens.remove(token).is_some())
    }

    async fn cleanup_expired_tokens(&self) -> Result<usize> {
        let mut tokens = lock(&self.access_tokens)?;
        Ok(purge_expired(&mut tokens, Utc::now()))
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryOAuthStorage {
    async fn store_refresh_token(&self, token: &RefreshToken) -> Result<()> {
        let mut tokens = lock(&self.refresh_tokens)?;
        insert_new(&mut tokens, &token.token, token)
    }

    async fn consume_refresh_token(
        &self,
        token: &str,
        inspect: &Inspector<'_, RefreshToken>,
    ) -> Result<Consumed<RefreshToken>> {
        let mut tokens = lock(&self.refresh_tokens)?;
        Ok(consume(&mut tokens, token, inspect))
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        let mut tokens = lock(&self.refresh_tokens)?;
        Ok(tokens.remove(token))
    }

    async fn cleanup_expired_refresh_tokens(&self) -> Result<usize> {
        let mut tokens = lock(&self.refresh_tokens)?;
        Ok(purge_expired(&mut tokens, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OAuthError;
    use chrono::Duration;
    use std::collections::BTreeSet;

    fn auth_code(code: &str, expires_at: DateTime<Utc>) -> AuthorizationCode {
        AuthorizationCode {
            code: code.to_string(),
            client_id: "client-1".to_string(),
            redirect_uri: "https://example.com/callback".to_string(),
            scopes: BTreeSet::new(),
            code_challenge: "challenge".to_string(),
            code_challenge_method: CodeChallengeMethod::Plain,
            resource: None,
            created_at: Utc::now(),
            expires_at,
        }
    }

    fn access_token(token: &str, expires_at: DateTime<Utc>) -> AccessToken {
        AccessToken {
            token: token.to_string(),
            token_type: TokenType::Bearer,
            client_id: "client-1".to_string(),
            scopes: BTreeSet::new(),
            resource: None,
            created_at: Utc::now(),
            expires_at,
        }
    }

    fn refresh_token(token: &str, expires_at: DateTime<Utc>) -> RefreshToken {
        RefreshToken {
            token: token.to_string(),
            access_token: "at".to_string(),
            client_id: "client-1".to_string(),
            scopes: BTreeSet::new(),
            resource: None,
            created_at: Utc::now(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_consume_code_accept_removes() {
        let storage = MemoryOAuthStorage::new();
        let code = auth_code("code-1", Utc::now() + Duration::minutes(5));
        storage.store_code(&code).await.unwrap();

        let first = storage
            .consume_code("code-1", &|_| Inspection::Accept)
            .await
            .unwrap();
        assert!(matches!(first, Consumed::Taken(c) if c.code == "code-1"));

        let second = storage
            .consume_code("code-1", &|_| Inspection::Accept)
            .await
            .unwrap();
        assert!(matches!(second, Consumed::Missing));
    }

    #[tokio::test]
    async fn test_consume_code_reject_keeps_record() {
        let storage = MemoryOAuthStorage::new();
        let code = auth_code("code-1", Utc::now() + Duration::minutes(5));
        storage.store_code(&code).await.unwrap();

        let rejected = storage
            .consume_code("code-1", &|_| {
                Inspection::Reject(OAuthError::InvalidGrant("wrong client".to_string()))
            })
            .await
            .unwrap();
        assert!(matches!(rejected, Consumed::Rejected(OAuthError::InvalidGrant(_))));

        let taken = storage
            .consume_code("code-1", &|_| Inspection::Accept)
            .await
            .unwrap();
        assert!(matches!(taken, Consumed::Taken(_)));
    }

    #[tokio::test]
    async fn test_consume_code_evict_removes_record() {
        let storage = MemoryOAuthStorage::new();
        let code = auth_code("code-1", Utc::now() - Duration::seconds(1));
        storage.store_code(&code).await.unwrap();

        let evicted = storage
            .consume_code("code-1", &|_| {
                Inspection::Evict(OAuthError::InvalidGrant("expired".to_string()))
            })
            .await
            .unwrap();
        assert!(matches!(evicted, Consumed::Rejected(_)));

        let missing = storage
            .consume_code("code-1", &|_| Inspection::Accept)
            .await
            .unwrap();
        assert!(matches!(missing, Consumed::Missing));
    }

    #[tokio::test]
    async fn test_duplicate_code_is_rejected() {
        let storage = MemoryOAuthStorage::new();
        let code = auth_code("code-1", Utc::now() + Duration::minutes(5));
        storage.store_code(&code).await.unwrap();

        let result = storage.store_code(&code).await;
        assert!(matches!(result, Err(StorageError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn test_get_token_evicts_expired() {
        let storage = MemoryOAuthStorage::new();
        storage
            .store_token(&access_token("live", Utc::now() + Duration::hours(1)))
            .await
            .unwrap();
        storage
            .store_token(&access_token("stale", Utc::now() - Duration::seconds(1)))
            .await
            .unwrap();

        assert!(storage.get_token("live").await.unwrap().is_some());
        assert!(storage.get_token("stale").await.unwrap().is_none());
        // Already evicted by the read above
        assert!(!storage.revoke_token("stale").await.unwrap());
        assert!(storage.revoke_token("live").await.unwrap());
        assert!(storage.get_token("live").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_token_consume_and_revoke() {
        let storage = MemoryOAuthStorage::new();
        storage
            .store_refresh_token(&refresh_token("rt-1", Utc::now() + Duration::days(1)))
            .await
            .unwrap();

        let taken = storage
            .consume_refresh_token("rt-1", &|_| Inspection::Accept)
            .await
            .unwrap();
        assert!(matches!(taken, Consumed::Taken(t) if t.token == "rt-1"));
        assert!(storage.revoke_refresh_token("rt-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let storage = MemoryOAuthStorage::new();
        let now = Utc::now();

        storage
            .store_code(&auth_code("old", now - Duration::minutes(1)))
            .await
            .unwrap();
        storage
            .store_code(&auth_code("new", now + Duration::minutes(5)))
            .await
            .unwrap();
        storage
            .store_token(&access_token("old", now - Duration::minutes(1)))
            .await
            .unwrap();
        storage
            .store_refresh_token(&refresh_token("old", now - Duration::minutes(1)))
            .await
            .unwrap();

        assert_eq!(storage.cleanup_expired_codes().await.unwrap(), 1);
        assert_eq!(storage.cleanup_expired_tokens().await.unwrap(), 1);
        assert_eq!(storage.cleanup_expired_refresh_tokens().await.unwrap(), 1);
        assert_eq!(storage.cleanup_expired_codes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_client_storage() {
        let storage = MemoryOAuthStorage::new();
        let client = OAuthClient {
            client_id: "client-1".to_string(),
            client_secret: Some("secret".to_string()),
            client_name: None,
            redirect_uris: vec!["https://example.com/callback".to_string()],
            grant_types: vec![GrantType::AuthorizationCode],
            response_types: vec![ResponseType::Code],
            scope: None,
            token_endpoint_auth_method: ClientAuthMethod::ClientSecretPost,
            created_at: Utc::now(),
            metadata: serde_json::Value::Null,
        };

        storage.store_client(&client).await.unwrap();
        let found = storage.get_client("client-1").await.unwrap().unwrap();
        assert_eq!(found.redirect_uris, client.redirect_uris);
        assert!(storage.get_client("missing").await.unwrap().is_none());
    }
}
