//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::{metrics_handler, register_metrics};
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/rest/auth/register", post(handlers::register))
        .route(
            "/rest/auth/token",
            get(handlers::get_challenge).post(handlers::post_token),
        )
        .route("/rest/auth/validate", get(handlers::validate))
        .route("/rest/auth/key", get(handlers::get_key));

    let artifact_routes = Router::new()
        // Health check (unauthenticated, for load balancers and probes)
        .route("/rest/health", get(handlers::health_check))
        // Uploads carry whole artifacts, well past the default body limit
        .route(
            "/rest/{repo}",
            post(handlers::upload_artifact).layer(DefaultBodyLimit::max(
                state.config.server.max_upload_bytes,
            )),
        )
        .route("/rest/{repo}/list", get(handlers::list_artifacts))
        .route("/rest/{repo}/info", get(handlers::artifact_info))
        .route("/rest/{repo}/get", get(handlers::download_artifact));

    let mut router = Router::new().merge(auth_routes).merge(artifact_routes);

    // SECURITY: /metrics is unauthenticated; restrict it at the network level.
    if state.config.server.metrics_enabled {
        register_metrics();
        router = router.route("/metrics", get(metrics_handler));
    }

    // Middleware layers are applied in reverse order (outermost first).
    // Order of execution: TraceLayer -> Auth -> Handler
    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
