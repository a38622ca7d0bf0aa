//! Challenge and session token repository.

use crate::error::MetadataResult;
use crate::models::{ChallengeRow, TokenRow};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for authentication challenges and session tokens.
#[async_trait]
pub trait AuthRepo: Send + Sync {
    /// Store a challenge, replacing any outstanding one for the same user.
    async fn save_challenge(&self, challenge: &ChallengeRow) -> MetadataResult<()>;

    /// Atomically remove and return the challenge if it matches.
    ///
    /// A second call with the same value returns `None`. Expiry is not
    /// checked here.
    async fn consume_challenge(
        &self,
        username: &str,
        challenge: &str,
    ) -> MetadataResult<Option<ChallengeRow>>;

    /// Delete challenges that expired before `now`.
    async fn delete_expired_challenges(&self, now: OffsetDateTime) -> MetadataResult<u64>;

    /// Create a token.
    async fn create_token(&self, token: &TokenRow) -> MetadataResult<()>;

    /// Get a token by hash.
    async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>>;

    /// Update last used time.
    async fn touch_token(&self, token_hash: &str, used_at: OffsetDateTime) -> MetadataResult<()>;

    /// Delete tokens that expired before `now`.
    async fn delete_expired_tokens(&self, now: OffsetDateTime) -> MetadataResult<u64>;
}
