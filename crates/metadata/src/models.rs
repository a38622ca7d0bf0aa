//! Database models mapping to the metadata schema.

use depot_core::{ArtifactRecord, RepoKind, Scope, format_upload_date};
use sqlx::FromRow;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{MetadataError, MetadataResult};

// =============================================================================
// Users
// =============================================================================

/// Registered user, identified by a public key.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub username: String,
    pub public_key: String,
    pub fingerprint: String,
    /// Byte ceiling; negative means unlimited.
    pub quota_limit: i64,
    pub quota_used: i64,
    pub created_at: OffsetDateTime,
}

impl UserRow {
    /// Bytes still available, or `None` when the quota is unlimited.
    pub fn remaining_quota(&self) -> Option<u64> {
        if self.quota_limit < 0 {
            None
        } else {
            Some(self.quota_limit.saturating_sub(self.quota_used).max(0) as u64)
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Outstanding authentication challenge. At most one per user.
#[derive(Debug, Clone, FromRow)]
pub struct ChallengeRow {
    pub username: String,
    pub challenge: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// Session token, stored by digest only.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub token_hash: String,
    pub username: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
}

// =============================================================================
// Artifacts
// =============================================================================

/// Cataloged artifact.
#[derive(Debug, Clone, FromRow)]
pub struct ArtifactRow {
    pub file_id: Uuid,
    pub owner: String,
    pub name: String,
    pub filename: String,
    pub repo: String,
    pub version: String,
    pub tags: String,
    pub md5: String,
    pub sha256: String,
    pub size: i64,
    pub uploaded_at: OffsetDateTime,
    pub description: String,
    pub architecture: String,
    pub parent: String,
    pub parent_owner: String,
    pub parent_version: String,
    pub pref_size: String,
    /// Object store key holding the bytes.
    pub storage_key: String,
    pub private: bool,
}

impl ArtifactRow {
    /// Convert into the wire record.
    pub fn into_record(self) -> MetadataResult<ArtifactRecord> {
        let repo = RepoKind::from_str(&self.repo)
            .map_err(|e| MetadataError::Internal(format!("artifact {}: {e}", self.file_id)))?;
        let scope = if self.private {
            Scope::Private
        } else {
            Scope::Public
        };
        Ok(ArtifactRecord {
            file_id: self.file_id.to_string(),
            owner: self.owner,
            name: self.name,
            filename: self.filename,
            repo,
            version: self.version,
            scope,
            md5: self.md5,
            sha256: self.sha256,
            size: self.size.max(0) as u64,
            tags: self.tags,
            upload_date: format_upload_date(self.uploaded_at),
            upload_timestamp: self.uploaded_at.unix_timestamp().to_string(),
            description: self.description,
            architecture: self.architecture,
            parent: self.parent,
            parent_version: self.parent_version,
            parent_owner: self.parent_owner,
            pref_size: self.pref_size,
        })
    }
}
