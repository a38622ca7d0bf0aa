//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Maximum request body size accepted on upload routes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Accept unsigned name/key registrations from loopback peers.
    #[serde(default = "default_trust_loopback_registration")]
    pub trust_loopback_registration: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    4 * 1024 * 1024 * 1024
}

fn default_trust_loopback_registration() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
            max_upload_bytes: default_max_upload_bytes(),
            trust_loopback_registration: default_trust_loopback_registration(),
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for stored artifacts.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Seconds a request may wait for the database connection.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// Where to read a public key from.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KeySource {
    /// Key stored in a file.
    File { path: PathBuf },
    /// Key stored in an environment variable.
    Env { var: String },
    /// Key given inline.
    Value { key: String },
}

/// Identity and session configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Username whose key signs self-service registrations.
    #[serde(default = "default_registrar_name")]
    pub registrar_name: String,
    /// Public key of the registrar, upserted at startup when set.
    #[serde(default)]
    pub registrar_key: Option<KeySource>,
    /// How long an issued challenge can be answered.
    #[serde(default = "default_challenge_ttl_secs")]
    pub challenge_ttl_secs: u64,
    /// How long an issued session token stays valid.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// Interval between sweeps of expired challenges and tokens.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_registrar_name() -> String {
    "Hub".to_string()
}

fn default_challenge_ttl_secs() -> u64 {
    300
}

fn default_token_ttl_secs() -> u64 {
    30 * 24 * 3600
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            registrar_name: default_registrar_name(),
            registrar_key: None,
            challenge_ttl_secs: default_challenge_ttl_secs(),
            token_ttl_secs: default_token_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl AuthConfig {
    /// Challenge lifetime as a Duration.
    pub fn challenge_ttl(&self) -> Duration {
        Duration::seconds(i64::try_from(self.challenge_ttl_secs).unwrap_or(i64::MAX))
    }

    /// Token lifetime as a Duration.
    pub fn token_ttl(&self) -> Duration {
        Duration::seconds(i64::try_from(self.token_ttl_secs).unwrap_or(i64::MAX))
    }

    /// Cleanup interval as a std::time::Duration.
    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Validate auth configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.registrar_name.trim().is_empty() {
            return Err("auth.registrar_name cannot be empty".to_string());
        }
        if self.challenge_ttl_secs == 0 {
            return Err("auth.challenge_ttl_secs must be at least 1".to_string());
        }
        if self.token_ttl_secs == 0 {
            return Err("auth.token_ttl_secs must be at least 1".to_string());
        }
        // tokio::time::interval panics on a zero period
        if self.cleanup_interval_secs == 0 {
            return Err("auth.cleanup_interval_secs must be at least 1".to_string());
        }
        for (field, secs) in [
            ("challenge_ttl_secs", self.challenge_ttl_secs),
            ("token_ttl_secs", self.token_ttl_secs),
        ] {
            if secs > i64::MAX as u64 {
                return Err(format!("auth.{field} {secs} would overflow Duration"));
            }
        }
        Ok(())
    }
}

/// Per-user quota configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Quota assigned to newly registered users. Negative means unlimited.
    #[serde(default = "default_quota_limit_bytes")]
    pub default_limit_bytes: i64,
}

fn default_quota_limit_bytes() -> i64 {
    2 * 1024 * 1024 * 1024
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_limit_bytes: default_quota_limit_bytes(),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Short TTLs and unlimited quotas.
    pub fn for_testing() -> Self {
        Self {
            auth: AuthConfig {
                challenge_ttl_secs: 60,
                token_ttl_secs: 3600,
                ..AuthConfig::default()
            },
            quota: QuotaConfig {
                default_limit_bytes: -1,
            },
            ..Self::default()
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.auth.validate()?;
        if self.server.max_upload_bytes == 0 {
            return Err("server.max_upload_bytes must be at least 1".to_string());
        }
        Ok(())
    }
}
