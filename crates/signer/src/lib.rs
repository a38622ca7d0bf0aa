//! Keys, fingerprints and signed-message verification for depot.
//!
//! This crate provides:
//! - Ed25519 key generation and `label:base64` encoding
//! - Public key fingerprints, used as registered usernames
//! - The clear-signed message envelope
//! - The `SignatureVerifier` capability consumed by the identity service

pub mod envelope;
pub mod error;
pub mod key;
pub mod verifier;

pub use envelope::SignedMessage;
pub use error::{SignerError, SignerResult};
pub use key::{KeyPair, PublicKey, SecretKey, fingerprint};
pub use verifier::{Ed25519Verifier, MessageSigner, SignatureVerifier, VerifiedMessage};
