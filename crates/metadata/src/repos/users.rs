//! User and quota repository.

use crate::error::MetadataResult;
use crate::models::UserRow;
use async_trait::async_trait;

/// Repository for registered users and their quota counters.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a user, or replace the key of an existing one. Quota state of
    /// an existing user is left untouched.
    async fn upsert_user(&self, user: &UserRow) -> MetadataResult<()>;

    /// Get a user by name.
    async fn get_user(&self, username: &str) -> MetadataResult<Option<UserRow>>;

    /// Set a user's quota limit. Negative means unlimited.
    async fn set_quota_limit(&self, username: &str, limit: i64) -> MetadataResult<()>;

    /// Add `bytes` to the user's usage if it stays within the limit.
    ///
    /// Returns `false`, leaving usage unchanged, when the charge would
    /// exceed the limit or the user does not exist.
    async fn charge_quota(&self, username: &str, bytes: u64) -> MetadataResult<bool>;

    /// Give back previously charged bytes.
    async fn refund_quota(&self, username: &str, bytes: u64) -> MetadataResult<()>;
}
