//! Application state shared across handlers.

use dashmap::DashMap;
use depot_core::SecretGenerator;
use depot_core::config::AppConfig;
use depot_metadata::MetadataStore;
use depot_signer::{Ed25519Verifier, SignatureVerifier};
use depot_storage::ObjectStore;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key async locks.
///
/// Serializes placement, processing and sweeping of one storage key. Entries
/// are dropped again once nobody holds or waits for them.
#[derive(Clone, Default)]
pub struct KeyLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held lock on one key. Released on drop.
pub struct KeyLockGuard {
    key: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl KeyLocks {
    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyLockGuard {
        let mutex = self.locks.entry(key.to_string()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyLockGuard {
            key: key.to_string(),
            locks: self.locks.clone(),
            _guard: guard,
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        // The map and this guard hold one reference each; more means waiters.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) <= 2);
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Signed-message verification capability.
    pub verifier: Arc<dyn SignatureVerifier>,
    /// Process-wide source of challenges and tokens, seeded once.
    pub secrets: Arc<SecretGenerator>,
    /// Locks on storage keys.
    pub key_locks: KeyLocks,
}

impl AppState {
    /// Create application state with the ed25519 verifier and an entropy-seeded
    /// secret generator.
    ///
    /// # Panics
    ///
    /// Panics if configuration validation fails.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self::with_parts(
            config,
            storage,
            metadata,
            Arc::new(Ed25519Verifier),
            Arc::new(SecretGenerator::from_entropy()),
        )
    }

    /// Create application state from explicit collaborators.
    ///
    /// # Panics
    ///
    /// Panics if configuration validation fails.
    pub fn with_parts(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        verifier: Arc<dyn SignatureVerifier>,
        secrets: Arc<SecretGenerator>,
    ) -> Self {
        if let Err(error) = config.validate() {
            panic!("Invalid configuration: {error}");
        }
        if config.quota.default_limit_bytes < 0 {
            tracing::warn!("quota.default_limit_bytes is negative, new users get unlimited quota");
        }

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            verifier,
            secrets,
            key_locks: KeyLocks::default(),
        }
    }
}
