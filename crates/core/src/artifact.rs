//! Artifact records, repository kinds and search filters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use time::macros::format_description;

/// The collection an artifact is uploaded into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    /// Debian package (`.deb`), stored under its original filename.
    Apt,
    /// Opaque file, stored under its MD5 digest.
    Raw,
    /// Container template bundle, stored under its MD5 digest.
    Template,
}

impl RepoKind {
    /// All kinds, in routing order.
    pub const ALL: [RepoKind; 3] = [RepoKind::Apt, RepoKind::Raw, RepoKind::Template];

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Raw => "raw",
            Self::Template => "template",
        }
    }

    /// Whether stored bytes are renamed to their MD5 digest.
    pub fn is_content_addressed(&self) -> bool {
        !matches!(self, Self::Apt)
    }
}

impl FromStr for RepoKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "apt" => Ok(Self::Apt),
            "raw" => Ok(Self::Raw),
            "template" => Ok(Self::Template),
            other => Err(crate::Error::InvalidRepo(other.to_string())),
        }
    }
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may see an artifact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Public,
    Private,
}

impl Scope {
    /// Interpret the `private` upload form field.
    pub fn from_private_flag(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Self::Private,
            _ => Self::Public,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private)
    }
}

/// A cataloged artifact as returned by search and upload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    #[serde(rename = "id")]
    pub file_id: String,
    pub owner: String,
    pub name: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub repo: RepoKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    pub scope: Scope,
    pub md5: String,
    pub sha256: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tags: String,
    #[serde(rename = "upload-date-formatted")]
    pub upload_date: String,
    #[serde(rename = "upload-date-timestamp")]
    pub upload_timestamp: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent: String,
    #[serde(
        rename = "parent-version",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub parent_version: String,
    #[serde(
        rename = "parent-owner",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub parent_owner: String,
    #[serde(rename = "prefsize", default, skip_serializing_if = "String::is_empty")]
    pub pref_size: String,
}

impl ArtifactRecord {
    /// Check whether `viewer` may see this record.
    pub fn is_visible_to(&self, viewer: Option<&str>) -> bool {
        !self.scope.is_private() || viewer == Some(self.owner.as_str())
    }
}

/// Human-readable upload date, e.g. `2024-03-01 12:30:05`.
pub fn format_upload_date(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.format(&format)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Exact-match search filter. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArtifactFilter {
    pub file_id: Option<String>,
    pub owner: Option<String>,
    pub name: Option<String>,
    pub repo: Option<RepoKind>,
    pub version: Option<String>,
    pub tags: Option<String>,
}

impl ArtifactFilter {
    /// Filter on a single repository kind.
    pub fn for_repo(repo: RepoKind) -> Self {
        Self {
            repo: Some(repo),
            ..Self::default()
        }
    }
}
