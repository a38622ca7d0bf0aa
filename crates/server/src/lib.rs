//! HTTP API server for the depot artifact repository.
//!
//! This crate provides:
//! - Key registration and challenge-response session issuance
//! - Streaming uploads under per-user quotas into content-addressed storage
//! - Format processors for apt packages, raw files and templates
//! - Exact-match search, lookup and download over the catalog

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod processors;
pub mod routes;
pub mod search;
pub mod state;
pub mod upload;

pub use auth::{AuthenticatedUser, TraceId};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
