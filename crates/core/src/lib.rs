//! Core domain types and shared logic for the depot artifact repository.
//!
//! This crate defines the data model used across all other crates:
//! - Repository kinds, artifact records and search filters
//! - Debian control and template config parsing
//! - Template validation rules
//! - Content digests and token hashing
//! - Challenge and token generation
//! - Configuration

pub mod artifact;
pub mod config;
pub mod control;
pub mod error;
pub mod hash;
pub mod template;
pub mod token;

pub use artifact::{ArtifactFilter, ArtifactRecord, RepoKind, Scope, format_upload_date};
pub use control::ControlFields;
pub use error::{Error, Result};
pub use hash::{ContentDigests, DigestHasher, hash_token};
pub use template::{ParentRef, TEMPLATE_CONFIG_MEMBER, TemplateConfig};
pub use token::{Secret, SecretGenerator, Session};

/// Quota limit value meaning "no limit".
pub const UNLIMITED_QUOTA: i64 = -1;
