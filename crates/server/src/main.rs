//! depot server binary.

use anyhow::{Context, Result};
use clap::Parser;
use depot_core::config::AppConfig;
use depot_server::bootstrap::ensure_registrar;
use depot_server::identity::spawn_cleanup_task;
use depot_server::upload::sweep_staging;
use depot_server::{AppState, create_router};
use depot_signer::Ed25519Verifier;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// depot - an artifact repository for apt packages, raw files and templates
#[derive(Parser, Debug)]
#[command(name = "depotd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "DEPOT_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("depot v{}", env!("CARGO_PKG_VERSION"));

    // The file is optional; defaults and DEPOT_ variables cover everything.
    let mut figment = Figment::new();
    if std::path::Path::new(&args.config).exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::info!(config_path = %args.config, "No config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("DEPOT_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    let storage = depot_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    let metadata = depot_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    ensure_registrar(metadata.as_ref(), &Ed25519Verifier, &config.auth).await?;

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, storage, metadata);
    sweep_staging(&state)
        .await
        .context("failed to sweep staged uploads")?;

    let _cleanup = spawn_cleanup_task(state.clone());
    tracing::info!(
        interval_secs = state.config.auth.cleanup_interval_secs,
        "Credential cleanup task spawned"
    );

    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    // ConnectInfo identifies loopback callers for trusted registration.
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
