//! Challenge and session token generation.

use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use std::fmt;
use time::OffsetDateTime;

/// Number of random bytes mixed into every generated secret.
const SECRET_ENTROPY_BYTES: usize = 32;

/// Process-wide generator for challenges and session tokens.
///
/// The underlying CSPRNG is seeded once from the operating system when the
/// generator is created and then shared behind a lock. Each secret is the
/// SHA-256 of the issue time, the username and fresh random bytes.
pub struct SecretGenerator {
    rng: Mutex<ChaCha20Rng>,
}

impl SecretGenerator {
    /// Create a generator seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::from_entropy()),
        }
    }

    /// Create a deterministic generator. Test use only.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::from_seed(seed)),
        }
    }

    /// Generate a fresh secret bound to `username` and `now`.
    pub fn generate(&self, username: &str, now: OffsetDateTime) -> Secret {
        let mut random = [0u8; SECRET_ENTROPY_BYTES];
        self.rng.lock().fill_bytes(&mut random);

        let mut hasher = Sha256::new();
        hasher.update(now.unix_timestamp_nanos().to_be_bytes());
        hasher.update(username.as_bytes());
        hasher.update(random);
        Secret(hex::encode(hasher.finalize()))
    }
}

impl fmt::Debug for SecretGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretGenerator")
    }
}

/// A generated challenge or token value (64 lowercase hex chars).
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Borrow the secret text.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume into the secret text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

/// A session resolved from a stored token hash.
#[derive(Clone, Debug)]
pub struct Session {
    /// Owning username.
    pub username: String,
    /// When the token was issued.
    pub created_at: OffsetDateTime,
    /// When the token stops being accepted.
    pub expires_at: OffsetDateTime,
}

impl Session {
    /// Check if the session is still valid at `now`.
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }
}
