//! Signer error types.

use thiserror::Error;

/// Key handling and verification errors.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("key parsing error: {0}")]
    KeyParsing(String),

    #[error("malformed signed message: {0}")]
    MalformedMessage(String),

    #[error("invalid signature format: {0}")]
    InvalidSignature(String),

    #[error("verification failed")]
    VerificationFailed,
}

/// Result type for signer operations.
pub type SignerResult<T> = std::result::Result<T, SignerError>;
