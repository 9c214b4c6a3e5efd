//! Trait-based storage abstractions with an in-memory backend.

pub mod inmemory;
pub mod traits;

pub use inmemory::MemoryOAuthStorage;
pub use traits::*;

/// Purge every expired code and token, returning how many records were removed.
///
/// Expiry is already enforced when records are read; this only bounds memory.
pub async fn cleanup_expired(storage: &dyn OAuthStorage) -> Result<usize> {
    let codes = storage.cleanup_expired_codes().await?;
    let access_tokens = storage.cleanup_expired_tokens().await?;
    let refresh_tokens = storage.cleanup_expired_refresh_tokens().await?;

    tracing::debug!(codes, access_tokens, refresh_tokens, "expired records purged");
    Ok(codes + access_tokens + refresh_tokens)
}
