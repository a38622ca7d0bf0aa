//! Prometheus metrics for the depot server.
//!
//! The `/metrics` endpoint is unauthenticated. Labels carry repository kinds
//! and outcome classes only, never usernames, filenames or digests.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Upload metrics
pub static UPLOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("depot_uploads_total", "Total uploads by repository and outcome"),
        &["repo", "outcome"],
    )
    .expect("metric creation failed")
});

pub static UPLOAD_BYTES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "depot_upload_bytes_total",
            "Bytes of successfully cataloged uploads",
        ),
        &["repo"],
    )
    .expect("metric creation failed")
});

pub static UPLOAD_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "depot_upload_duration_seconds",
            "Time from request to cataloged record",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["repo"],
    )
    .expect("metric creation failed")
});

pub static QUOTA_REJECTIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_quota_rejections_total",
        "Uploads rejected for exceeding the owner's quota",
    )
    .expect("metric creation failed")
});

pub static DEDUPLICATED_UPLOADS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_deduplicated_uploads_total",
        "Uploads whose content was already stored",
    )
    .expect("metric creation failed")
});

pub static ORPHANS_SWEPT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_orphans_swept_total",
        "Stored objects deleted after their upload was rejected",
    )
    .expect("metric creation failed")
});

// Auth metrics
pub static AUTH_CHALLENGES_ISSUED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_auth_challenges_issued_total",
        "Authentication challenges issued",
    )
    .expect("metric creation failed")
});

pub static AUTH_TOKENS_ISSUED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("depot_auth_tokens_issued_total", "Session tokens issued")
        .expect("metric creation failed")
});

pub static AUTH_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("depot_auth_failures_total", "Authentication failures by reason"),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static REGISTRATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "depot_registrations_total",
            "Successful registrations by path (trusted or signed)",
        ),
        &["path"],
    )
    .expect("metric creation failed")
});

// Search metrics
pub static SEARCH_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("depot_search_requests_total", "Catalog queries by operation"),
        &["operation"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests can build many routers in one process.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOADS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_BYTES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(QUOTA_REJECTIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DEDUPLICATED_UPLOADS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ORPHANS_SWEPT.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(AUTH_CHALLENGES_ISSUED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(AUTH_TOKENS_ISSUED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(AUTH_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REGISTRATIONS.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(SEARCH_REQUESTS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record the outcome of an upload.
pub fn record_upload(repo: &str, outcome: &str) {
    UPLOADS.with_label_values(&[repo, outcome]).inc();
}

/// Record an authentication failure.
pub fn record_auth_failure(reason: &str) {
    AUTH_FAILURES.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_upload_counter_labels() {
        register_metrics();
        let before = UPLOADS.with_label_values(&["raw", "success"]).get();
        record_upload("raw", "success");
        assert_eq!(UPLOADS.with_label_values(&["raw", "success"]).get(), before + 1);
    }
}
