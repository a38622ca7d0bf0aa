//! Health endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub storage_backend: &'static str,
}

/// GET /rest/health - Check storage and metadata connectivity.
///
/// Unauthenticated. Returns only status, version and backend name.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.storage.health_check().await?;
    state.metadata.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        storage_backend: state.storage.backend_name(),
    }))
}
