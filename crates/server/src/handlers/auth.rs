//! Identity endpoints: registration and the challenge-response token exchange.
//!
//! All responses are plain text.

use crate::auth::get_trace_id;
use crate::error::{ApiError, ApiResult};
use crate::identity;
use crate::state::AppState;
use axum::Form;
use axum::extract::{ConnectInfo, FromRequest, Query, Request, State};
use serde::Deserialize;
use std::net::SocketAddr;

/// Registration form.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub name: Option<String>,
    pub key: Option<String>,
    /// Quota limit for a trusted registration. Negative means unlimited.
    pub quota: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub user: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

fn required(value: Option<String>, empty: &str) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(empty.to_string()))
}

/// POST /rest/auth/register - Register a public key.
///
/// A trusted local caller may send `name` and `key` directly. For anyone
/// else `key` must be a message signed by the registrar whose payload is the
/// key to register; a `name` sent along is ignored.
pub async fn register(State(state): State<AppState>, req: Request) -> ApiResult<String> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let trace_id = get_trace_id(&req).cloned().unwrap_or_default();

    let Form(form) = Form::<RegisterForm>::from_request(req, &state)
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let name = form.name.filter(|n| !n.trim().is_empty());
    let key = form.key.filter(|k| !k.trim().is_empty());

    match (name, key) {
        (Some(name), Some(key)) if identity::is_trusted_peer(&state, peer) => {
            identity::register_trusted(&state, &name, &key, form.quota).await
        }
        (name, Some(key)) => {
            if let Some(name) = name {
                tracing::info!(
                    peer = ?peer,
                    name = %name,
                    trace_id = %trace_id,
                    "Untrusted peer sent a name, registering the signed key instead"
                );
            }
            identity::register_signed(&state, &key).await
        }
        (_, None) => Err(ApiError::Unauthorized(
            "registration requires a signed key".to_string(),
        )),
    }
}

/// GET /rest/auth/token?user= - Issue a challenge for `user`.
pub async fn get_challenge(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<String> {
    let user = required(query.user, "Empty user")?;
    identity::issue_challenge(&state, &user).await
}

/// POST /rest/auth/token - Trade a signed challenge for a session token.
pub async fn post_token(
    State(state): State<AppState>,
    Form(form): Form<TokenForm>,
) -> ApiResult<String> {
    let user = required(form.user, "Empty user")?;
    let message = required(form.message, "Empty message")?;
    identity::issue_token(&state, &user, &message).await
}

/// GET /rest/auth/validate?token= - Check that a token is live.
pub async fn validate(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<&'static str> {
    let token = required(query.token, "Empty token")?;
    identity::validate_token(&state, &token).await?;
    Ok("Success")
}

/// GET /rest/auth/key?user= - The public key registered for `user`.
pub async fn get_key(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> ApiResult<String> {
    let user = required(query.user, "Empty user")?;
    identity::lookup_key(&state, &user).await
}
