//! Registrar initialization.

use anyhow::{Context, Result};
use depot_core::UNLIMITED_QUOTA;
use depot_core::config::{AuthConfig, KeySource};
use depot_metadata::MetadataStore;
use depot_metadata::models::UserRow;
use depot_signer::SignatureVerifier;
use time::OffsetDateTime;

/// Read a public key from its configured source.
pub async fn load_key(source: &KeySource) -> Result<String> {
    let key = match source {
        KeySource::File { path } => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read key file: {}", path.display()))?,
        KeySource::Env { var } => {
            std::env::var(var).with_context(|| format!("registrar key env var not set: {var}"))?
        }
        KeySource::Value { key } => key.clone(),
    };
    Ok(key.trim().to_string())
}

/// Upsert the registrar user with its configured key, so self-signed
/// registrations can be verified.
///
/// Does nothing when no registrar key is configured; signed registrations
/// then fail until the registrar is registered some other way.
pub async fn ensure_registrar(
    metadata: &dyn MetadataStore,
    verifier: &dyn SignatureVerifier,
    config: &AuthConfig,
) -> Result<()> {
    let Some(source) = &config.registrar_key else {
        tracing::warn!(
            registrar = %config.registrar_name,
            "No registrar key configured, signed registrations need a registered registrar"
        );
        return Ok(());
    };

    let public_key = load_key(source).await?;
    let fingerprint = verifier
        .fingerprint(&public_key)
        .context("failed to parse registrar key")?;

    metadata
        .upsert_user(&UserRow {
            username: config.registrar_name.clone(),
            public_key,
            fingerprint: fingerprint.clone(),
            quota_limit: UNLIMITED_QUOTA,
            quota_used: 0,
            created_at: OffsetDateTime::now_utc(),
        })
        .await?;
    tracing::info!(
        registrar = %config.registrar_name,
        fingerprint = %fingerprint,
        "Registrar key loaded"
    );
    Ok(())
}
