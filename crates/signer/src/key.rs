//! Ed25519 key types, text encoding and fingerprints.
//!
//! Keys travel as `label:base64`. A secret key encodes `secret || public`
//! (64 bytes); a public key encodes the 32 raw verifying-key bytes.

use crate::error::{SignerError, SignerResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of SHA-256 bytes kept in a fingerprint.
const FINGERPRINT_BYTES: usize = 20;

fn split_labeled(s: &str) -> SignerResult<(&str, Vec<u8>)> {
    let (label, b64) = s
        .trim()
        .split_once(':')
        .ok_or_else(|| SignerError::KeyParsing("expected 'label:base64' format".to_string()))?;
    let bytes = STANDARD
        .decode(b64)
        .map_err(|e| SignerError::KeyParsing(format!("invalid base64: {e}")))?;
    Ok((label, bytes))
}

/// A secret (private) key for signing.
pub struct SecretKey {
    inner: SigningKey,
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        let mut rng = rand_core::OsRng;
        Self {
            inner: SigningKey::generate(&mut rng),
        }
    }

    /// Parse from `label:base64(secret || public)`.
    pub fn parse(s: &str) -> SignerResult<(String, Self)> {
        let (label, bytes) = split_labeled(s)?;
        if bytes.len() != 64 {
            return Err(SignerError::KeyParsing(format!(
                "expected 64 bytes, got {}",
                bytes.len()
            )));
        }
        let secret_bytes: [u8; 32] = bytes[..32]
            .try_into()
            .map_err(|_| SignerError::KeyParsing("invalid secret key bytes".to_string()))?;
        let inner = SigningKey::from_bytes(&secret_bytes);
        if inner.verifying_key().as_bytes()[..] != bytes[32..] {
            return Err(SignerError::KeyParsing(
                "public half does not match secret key".to_string(),
            ));
        }
        Ok((label.to_string(), Self { inner }))
    }

    /// Encode as `label:base64(secret || public)`.
    pub fn encode(&self, label: &str) -> String {
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(self.inner.as_bytes());
        bytes.extend_from_slice(self.inner.verifying_key().as_bytes());
        format!("{label}:{}", STANDARD.encode(&bytes))
    }

    /// Get the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.inner
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// A public key for verification.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Parse from `label:base64(public)`.
    pub fn parse(s: &str) -> SignerResult<(String, Self)> {
        let (label, bytes) = split_labeled(s)?;
        let key_bytes: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            SignerError::KeyParsing(format!("expected 32 bytes, got {}", b.len()))
        })?;
        let inner = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| SignerError::KeyParsing(format!("invalid public key: {e}")))?;
        Ok((label.to_string(), Self { inner }))
    }

    /// Encode as `label:base64(public)`.
    pub fn encode(&self, label: &str) -> String {
        format!("{label}:{}", STANDARD.encode(self.inner.as_bytes()))
    }

    /// Stable identifier for this key: hex of the first 20 bytes of
    /// SHA-256 over the raw key. The label does not contribute.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.inner.as_bytes());
        hex::encode(&digest[..FINGERPRINT_BYTES])
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.inner
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

/// A key pair with its label.
pub struct KeyPair {
    /// The key label (e.g., the owner's name).
    pub label: String,
    /// The secret key.
    pub secret: SecretKey,
    /// The public key.
    pub public: PublicKey,
}

impl KeyPair {
    /// Generate a new key pair with the given label.
    pub fn generate(label: impl Into<String>) -> Self {
        let secret = SecretKey::generate();
        let public = secret.public_key();
        Self {
            label: label.into(),
            secret,
            public,
        }
    }

    /// Parse from an encoded secret key.
    pub fn from_secret_key(s: &str) -> SignerResult<Self> {
        let (label, secret) = SecretKey::parse(s)?;
        let public = secret.public_key();
        Ok(Self {
            label,
            secret,
            public,
        })
    }

    /// Encoded secret key.
    pub fn secret_key_string(&self) -> String {
        self.secret.encode(&self.label)
    }

    /// Encoded public key.
    pub fn public_key_string(&self) -> String {
        self.public.encode(&self.label)
    }

    /// Fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        self.public.fingerprint()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("label", &self.label)
            .field("public", &self.public)
            .finish()
    }
}

/// Derive the fingerprint of an encoded public key.
pub fn fingerprint(public_key: &str) -> SignerResult<String> {
    let (_, key) = PublicKey::parse(public_key)?;
    Ok(key.fingerprint())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_key_roundtrip() {
        let keypair = KeyPair::generate("alice");
        let parsed = KeyPair::from_secret_key(&keypair.secret_key_string()).unwrap();
        assert_eq!(parsed.label, "alice");
        assert_eq!(parsed.public, keypair.public);
    }

    #[test]
    fn test_public_key_roundtrip() {
        let keypair = KeyPair::generate("alice");
        let (label, public) = PublicKey::parse(&keypair.public_key_string()).unwrap();
        assert_eq!(label, "alice");
        assert_eq!(public, keypair.public);
    }

    #[test]
    fn test_fingerprint_shape_and_stability() {
        let keypair = KeyPair::generate("alice");
        let fp = keypair.fingerprint();
        assert_eq!(fp.len(), 40);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(fingerprint(&keypair.public_key_string()).unwrap(), fp);
        // Label does not affect the fingerprint
        assert_eq!(
            fingerprint(&keypair.public.encode("someone-else")).unwrap(),
            fp
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(PublicKey::parse("no-colon").is_err());
        assert!(PublicKey::parse("x:!!!").is_err());
        assert!(PublicKey::parse("x:AAAA").is_err());
        assert!(fingerprint("").is_err());
    }

    #[test]
    fn test_secret_key_rejects_mismatched_public_half() {
        let a = KeyPair::generate("a");
        let b = KeyPair::generate("b");
        let mut bytes = STANDARD
            .decode(a.secret_key_string().split_once(':').unwrap().1)
            .unwrap();
        bytes[32..].copy_from_slice(b.public.verifying_key().as_bytes());
        let forged = format!("a:{}", STANDARD.encode(bytes));
        assert!(SecretKey::parse(&forged).is_err());
    }
}
