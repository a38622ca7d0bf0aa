//! Signed-message verification capability and a matching signer.

use crate::envelope::{SignedMessage, signing_input};
use crate::error::{SignerError, SignerResult};
use crate::key::{KeyPair, PublicKey};
use ed25519_dalek::{Signature, Signer as _, Verifier as _};

/// Outcome of a successful verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedMessage {
    /// Signer label, authenticated by the signature.
    pub signer: String,
    /// The signed payload.
    pub payload: String,
}

/// Capability for checking signed messages against registered keys.
pub trait SignatureVerifier: Send + Sync {
    /// Verify `armored` with `public_key` and return the recovered signer and payload.
    fn verify(&self, public_key: &str, armored: &str) -> SignerResult<VerifiedMessage>;

    /// Derive the fingerprint of an encoded public key.
    fn fingerprint(&self, public_key: &str) -> SignerResult<String>;
}

/// Ed25519 implementation of [`SignatureVerifier`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, public_key: &str, armored: &str) -> SignerResult<VerifiedMessage> {
        let (_, key) = PublicKey::parse(public_key)?;
        let message = SignedMessage::parse(armored)?;
        let signature = Signature::from_bytes(&message.signature);

        key.verifying_key()
            .verify(&signing_input(&message.signer, &message.payload), &signature)
            .map_err(|_| SignerError::VerificationFailed)?;

        Ok(VerifiedMessage {
            signer: message.signer,
            payload: message.payload,
        })
    }

    fn fingerprint(&self, public_key: &str) -> SignerResult<String> {
        crate::key::fingerprint(public_key)
    }
}

/// Produces armored messages verifiable by [`Ed25519Verifier`].
pub struct MessageSigner {
    keypair: KeyPair,
}

impl MessageSigner {
    /// Create a signer from a key pair. The key label becomes the signer identity.
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// Generate a signer with a fresh key.
    pub fn generate(label: impl Into<String>) -> Self {
        Self::new(KeyPair::generate(label))
    }

    /// Signer identity written into messages.
    pub fn label(&self) -> &str {
        &self.keypair.label
    }

    /// Encoded public key.
    pub fn public_key(&self) -> String {
        self.keypair.public_key_string()
    }

    /// Fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        self.keypair.fingerprint()
    }

    /// Sign `payload` as `label()`.
    pub fn sign(&self, payload: &str) -> String {
        self.sign_as(&self.keypair.label, payload)
    }

    /// Sign `payload` under an explicit signer identity.
    pub fn sign_as(&self, signer: &str, payload: &str) -> String {
        let signature = self
            .keypair
            .secret
            .signing_key()
            .sign(&signing_input(signer, payload));
        SignedMessage {
            signer: signer.to_string(),
            payload: payload.to_string(),
            signature: signature.to_bytes(),
        }
        .armor()
    }
}
