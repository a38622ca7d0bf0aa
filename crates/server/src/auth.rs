//! Session resolution middleware and request identity extractors.

use crate::error::ApiError;
use crate::identity;
use crate::state::AppState;
use axum::extract::{FromRequestParts, OptionalFromRequestParts, Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;
use std::convert::Infallible;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Header carrying a raw session token.
pub const TOKEN_HEADER: &str = "token";

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value, truncated and limited
    /// to printable ASCII.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    /// Get the trace ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity resolved from a valid session token.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub username: String,
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("missing or invalid token".to_string()))
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for AuthenticatedUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthenticatedUser>().cloned())
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(&v[7..])
            } else {
                None
            }
        })
}

/// Raw token from the `token` header, a bearer header or the `token` query
/// parameter, in that order.
fn extract_token(req: &Request) -> Option<String> {
    let from_header = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| extract_bearer_token(req))
        .map(str::to_string);

    from_header
        .or_else(|| {
            Query::<TokenQuery>::try_from_uri(req.uri())
                .ok()
                .and_then(|Query(q)| q.token)
        })
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Resolve the session token, if any, and run the request inside a trace span.
///
/// An unknown or expired token leaves the request anonymous; handlers that
/// need an owner reject it through the [`AuthenticatedUser`] extractor.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = extract_or_generate_trace_id(&req);
    let trace_id_str = trace_id.0.clone();
    req.extensions_mut().insert(trace_id);

    if let Some(token) = extract_token(&req) {
        match identity::resolve_session(&state, &token).await? {
            Some(session) => {
                req.extensions_mut().insert(AuthenticatedUser {
                    username: session.username,
                });
            }
            None => {
                crate::metrics::record_auth_failure("invalid_token");
                tracing::debug!("request carried an unknown or expired token");
            }
        }
    }

    let response = next
        .run(req)
        .instrument(tracing::info_span!("request", trace_id = %trace_id_str))
        .await;

    Ok(response)
}

/// Get the trace ID from request extensions.
pub fn get_trace_id(req: &Request) -> Option<&TraceId> {
    req.extensions().get::<TraceId>()
}
