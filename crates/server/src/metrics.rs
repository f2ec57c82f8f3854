//! Prometheus metrics for the keg server.
//!
//! The `/metrics` endpoint is unauthenticated. It exposes aggregate counts
//! only, but should still be network-restricted to the Prometheus scraper.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Indexing metrics
pub static PACKAGES_INDEXED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "keg_packages_indexed_total",
            "Packages run through the indexing pipeline, by result",
        ),
        &["result"],
    )
    .expect("metric creation failed")
});

pub static INDEXING_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "keg_indexing_duration_seconds",
            "Time taken to index a pushed or mirrored package",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .expect("metric creation failed")
});

// Mirror metrics
pub static MIRROR_DOWNLOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "keg_mirror_downloads_total",
            "Read-through mirror attempts, by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static UPSTREAM_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "keg_upstream_errors_total",
            "Failed upstream feed requests, by operation",
        ),
        &["operation"],
    )
    .expect("metric creation failed")
});

// Deletion metrics
pub static PACKAGE_DELETIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "keg_package_deletions_total",
            "Delete requests applied, by policy",
        ),
        &["policy"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests and embedded routers can call it freely.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(PACKAGES_INDEXED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(INDEXING_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MIRROR_DOWNLOADS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPSTREAM_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PACKAGE_DELETIONS.clone()))
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

/// Record a failed upstream request.
pub fn record_upstream_error(operation: &str) {
    UPSTREAM_ERRORS.with_label_values(&[operation]).inc();
}
