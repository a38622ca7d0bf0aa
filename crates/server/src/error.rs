//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use depot_core::Error as CoreError;
use depot_metadata::MetadataError;
use depot_storage::StorageError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// No identity could be established for the request.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A signed proof was rejected.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// A self-signed registration did not verify against the registrar key.
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("fingerprint error: {0}")]
    FingerprintError(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The request body outgrew the configured upload limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("hash failed: {0}")]
    HashFailed(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("signer error: {0}")]
    Signer(#[from] depot_signer::SignerError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::SignatureInvalid(_) => "signature_invalid",
            Self::VerificationFailed(_) => "verification_failed",
            Self::FingerprintError(_) => "fingerprint_error",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::WriteFailed(_) => "write_failed",
            Self::HashFailed(_) => "hash_failed",
            Self::Internal(_) => "internal_error",
            Self::Storage(StorageError::HashMismatch { .. }) => "content_conflict",
            Self::Storage(_) => "storage_error",
            Self::Metadata(MetadataError::DependencyMissing(_)) => "dependency_missing",
            Self::Metadata(_) => "metadata_error",
            Self::Core(e) => match e {
                CoreError::InvalidRepo(_) => "invalid_repo",
                CoreError::MalformedArchive(_) => "malformed_archive",
                CoreError::ControlNotFound(_) => "control_not_found",
                CoreError::MissingField(_) => "missing_field",
                CoreError::OwnerMismatch { .. } => "owner_mismatch",
                CoreError::DependencyMissing { .. } => "dependency_missing",
                CoreError::InvalidFormat { .. } => "invalid_format",
            },
            Self::Signer(_) => "signer_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) | Self::SignatureInvalid(_) => StatusCode::UNAUTHORIZED,
            Self::VerificationFailed(_) | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::FingerprintError(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::QuotaExceeded(_) | Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::WriteFailed(_) | Self::HashFailed(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                StorageError::HashMismatch { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                MetadataError::AlreadyExists(_) | MetadataError::Constraint(_) => {
                    StatusCode::CONFLICT
                }
                MetadataError::DependencyMissing(_) => StatusCode::FAILED_DEPENDENCY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(e) => match e {
                CoreError::InvalidRepo(_) => StatusCode::NOT_FOUND,
                CoreError::OwnerMismatch { .. } => StatusCode::FORBIDDEN,
                CoreError::DependencyMissing { .. } => StatusCode::FAILED_DEPENDENCY,
                CoreError::MalformedArchive(_)
                | CoreError::ControlNotFound(_)
                | CoreError::MissingField(_)
                | CoreError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,
            },
            Self::Signer(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
