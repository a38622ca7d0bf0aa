//! Content digests and one-way credential hashing.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The pair of digests recorded for every stored artifact.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigests {
    md5: [u8; 16],
    sha256: [u8; 32],
}

impl ContentDigests {
    /// Compute both digests over a buffer.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Self::hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// Create an incremental hasher.
    pub fn hasher() -> DigestHasher {
        DigestHasher {
            md5: Md5::new(),
            sha256: Sha256::new(),
            bytes: 0,
        }
    }

    /// MD5 as lowercase hex. Non-apt artifacts are stored under this key.
    pub fn md5_hex(&self) -> String {
        hex::encode(self.md5)
    }

    /// SHA-256 as lowercase hex.
    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256)
    }

    /// Raw SHA-256 bytes.
    pub fn sha256(&self) -> &[u8; 32] {
        &self.sha256
    }
}

impl fmt::Debug for ContentDigests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentDigests")
            .field("md5", &self.md5_hex())
            .field("sha256", &&self.sha256_hex()[..16])
            .finish()
    }
}

/// Incremental MD5 + SHA-256 hasher fed from a byte stream.
pub struct DigestHasher {
    md5: Md5,
    sha256: Sha256,
    bytes: u64,
}

impl DigestHasher {
    /// Update both digests with data.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha256.update(data);
        self.bytes += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Finalize and return the digests.
    pub fn finalize(self) -> ContentDigests {
        ContentDigests {
            md5: self.md5.finalize().into(),
            sha256: self.sha256.finalize().into(),
        }
    }
}

/// One-way transform applied to session tokens before they are stored or looked up.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
