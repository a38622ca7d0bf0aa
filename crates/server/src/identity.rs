//! Key registration and challenge-response session issuance.
//!
//! Users are identified by an ed25519 public key. A session starts with
//! [`issue_challenge`]; the client signs the challenge with its key and trades
//! the signed message for a token in [`issue_token`]. Only the SHA-256 digest
//! of a token is stored, and the same digest is used on lookup.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use depot_core::{Session, hash_token};
use depot_metadata::MetadataStore;
use depot_metadata::models::{ChallengeRow, TokenRow, UserRow};
use std::net::SocketAddr;
use time::OffsetDateTime;

/// Whether a registration from `peer` may use the trusted name/key form.
pub fn is_trusted_peer(state: &AppState, peer: Option<SocketAddr>) -> bool {
    state.config.server.trust_loopback_registration && peer.is_some_and(|p| p.ip().is_loopback())
}

/// Register `name` with `public_key` directly, without proof of possession.
///
/// Only reachable from a trusted local caller. `quota` overrides the default
/// limit for the user.
pub async fn register_trusted(
    state: &AppState,
    name: &str,
    public_key: &str,
    quota: Option<i64>,
) -> ApiResult<String> {
    let name = name.trim();
    let public_key = public_key.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Empty name".to_string()));
    }
    if public_key.is_empty() {
        return Err(ApiError::BadRequest("Empty key".to_string()));
    }

    let fingerprint = state
        .verifier
        .fingerprint(public_key)
        .map_err(|e| ApiError::FingerprintError(e.to_string()))?;

    upsert(state, name, public_key, &fingerprint).await?;
    if let Some(limit) = quota {
        state.metadata.set_quota_limit(name, limit).await?;
    }

    metrics::REGISTRATIONS.with_label_values(&["trusted"]).inc();
    tracing::info!(username = %name, fingerprint = %fingerprint, "user registered (trusted)");
    Ok(name.to_string())
}

/// Register the key carried in a message signed by the registrar.
///
/// The payload of the message is the user's public key; the user is
/// registered under the key's fingerprint, so repeating a registration yields
/// the same username.
pub async fn register_signed(state: &AppState, armored: &str) -> ApiResult<String> {
    let registrar_name = &state.config.auth.registrar_name;
    let registrar = state.metadata.get_user(registrar_name).await?.ok_or_else(|| {
        ApiError::Unauthorized("self-service registration is not configured".to_string())
    })?;

    let verified = state
        .verifier
        .verify(&registrar.public_key, armored)
        .map_err(|e| {
            metrics::record_auth_failure("registration_signature");
            ApiError::VerificationFailed(e.to_string())
        })?;
    if verified.signer != *registrar_name {
        metrics::record_auth_failure("registration_signer");
        return Err(ApiError::VerificationFailed(format!(
            "message signed by {}, expected {registrar_name}",
            verified.signer
        )));
    }

    let public_key = verified.payload.trim();
    if public_key.is_empty() {
        return Err(ApiError::VerificationFailed(
            "signed message carries no key".to_string(),
        ));
    }
    let fingerprint = state
        .verifier
        .fingerprint(public_key)
        .map_err(|e| ApiError::FingerprintError(e.to_string()))?;

    upsert(state, &fingerprint, public_key, &fingerprint).await?;

    metrics::REGISTRATIONS.with_label_values(&["signed"]).inc();
    tracing::info!(username = %fingerprint, "user registered (signed)");
    Ok(fingerprint)
}

async fn upsert(state: &AppState, username: &str, public_key: &str, fingerprint: &str) -> ApiResult<()> {
    state
        .metadata
        .upsert_user(&UserRow {
            username: username.to_string(),
            public_key: public_key.to_string(),
            fingerprint: fingerprint.to_string(),
            quota_limit: state.config.quota.default_limit_bytes,
            quota_used: 0,
            created_at: OffsetDateTime::now_utc(),
        })
        .await?;
    Ok(())
}

/// Issue a fresh challenge for `username`, replacing any outstanding one.
pub async fn issue_challenge(state: &AppState, username: &str) -> ApiResult<String> {
    if state.metadata.get_user(username).await?.is_none() {
        return Err(ApiError::NotFound(format!("user {username}")));
    }

    let now = OffsetDateTime::now_utc();
    let challenge = state.secrets.generate(username, now);
    state
        .metadata
        .save_challenge(&ChallengeRow {
            username: username.to_string(),
            challenge: challenge.expose().to_string(),
            issued_at: now,
            expires_at: now + state.config.auth.challenge_ttl(),
        })
        .await?;

    metrics::AUTH_CHALLENGES_ISSUED.inc();
    tracing::debug!(username = %username, "challenge issued");
    Ok(challenge.into_string())
}

/// Trade a signed challenge for a session token.
///
/// The message must verify against `username`'s key, be signed under that
/// name, and carry the outstanding challenge. The challenge is consumed even
/// if it turns out to be expired.
pub async fn issue_token(state: &AppState, username: &str, armored: &str) -> ApiResult<String> {
    let reject = |reason: &'static str, message: String| {
        metrics::record_auth_failure(reason);
        ApiError::SignatureInvalid(message)
    };

    let user = state
        .metadata
        .get_user(username)
        .await?
        .ok_or_else(|| reject("unknown_user", format!("no key registered for {username}")))?;

    let verified = state
        .verifier
        .verify(&user.public_key, armored)
        .map_err(|e| reject("bad_signature", e.to_string()))?;
    if verified.signer != username {
        return Err(reject(
            "signer_mismatch",
            format!("message signed by {}, expected {username}", verified.signer),
        ));
    }

    let now = OffsetDateTime::now_utc();
    let challenge = state
        .metadata
        .consume_challenge(username, verified.payload.trim())
        .await?
        .ok_or_else(|| {
            reject(
                "unknown_challenge",
                "challenge was not issued or was already used".to_string(),
            )
        })?;
    if challenge.expires_at <= now {
        return Err(reject("expired_challenge", "challenge expired".to_string()));
    }

    let token = state.secrets.generate(username, now);
    state
        .metadata
        .create_token(&TokenRow {
            token_hash: hash_token(token.expose()),
            username: username.to_string(),
            created_at: now,
            expires_at: now + state.config.auth.token_ttl(),
            last_used_at: None,
        })
        .await?;

    metrics::AUTH_TOKENS_ISSUED.inc();
    tracing::info!(username = %username, "session token issued");
    Ok(token.into_string())
}

/// Look up the session behind a raw token. Unknown and expired tokens give `None`.
pub async fn resolve_session(state: &AppState, token: &str) -> ApiResult<Option<Session>> {
    let token_hash = hash_token(token);
    let Some(row) = state.metadata.get_token_by_hash(&token_hash).await? else {
        return Ok(None);
    };

    let now = OffsetDateTime::now_utc();
    let session = Session {
        username: row.username,
        created_at: row.created_at,
        expires_at: row.expires_at,
    };
    if !session.is_valid_at(now) {
        return Ok(None);
    }

    // Update last used time (fire and forget)
    let metadata = state.metadata.clone();
    tokio::spawn(async move {
        let _ = metadata.touch_token(&token_hash, now).await;
    });

    Ok(Some(session))
}

/// Check a raw token, failing with `Forbidden` when it does not resolve.
pub async fn validate_token(state: &AppState, token: &str) -> ApiResult<Session> {
    resolve_session(state, token).await?.ok_or_else(|| {
        metrics::record_auth_failure("invalid_token");
        ApiError::Forbidden("invalid or expired token".to_string())
    })
}

/// The public key registered for `username`.
pub async fn lookup_key(state: &AppState, username: &str) -> ApiResult<String> {
    state
        .metadata
        .get_user(username)
        .await?
        .map(|user| user.public_key)
        .ok_or_else(|| ApiError::NotFound(format!("user {username}")))
}

/// Delete expired challenges and tokens. Returns how many rows went.
pub async fn sweep_expired_credentials(
    metadata: &dyn MetadataStore,
    now: OffsetDateTime,
) -> ApiResult<(u64, u64)> {
    let challenges = metadata.delete_expired_challenges(now).await?;
    let tokens = metadata.delete_expired_tokens(now).await?;
    if challenges > 0 || tokens > 0 {
        tracing::info!(challenges, tokens, "expired credentials removed");
    }
    Ok((challenges, tokens))
}

/// Run [`sweep_expired_credentials`] on the configured interval.
pub fn spawn_cleanup_task(state: AppState) -> tokio::task::JoinHandle<()> {
    let interval = state.config.auth.cleanup_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) =
                sweep_expired_credentials(state.metadata.as_ref(), OffsetDateTime::now_utc()).await
            {
                tracing::warn!(error = %e, "credential cleanup failed");
            }
        }
    })
}
