//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Mutation Metrics
    pub static ref MUTATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedstore_mutations_total", "Total number of optimistic mutations"),
        &["action", "outcome"]
    ).expect("metric can be created");

    // Fetch Metrics
    pub static ref FETCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedstore_fetches_total", "Total number of network fetches"),
        &["strategy", "status"]
    ).expect("metric can be created");
    pub static ref FETCH_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "feedstore_fetch_duration_seconds",
            "Network fetch duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0]),
        &["strategy"]
    ).expect("metric can be created");

    // Cache Metrics
    pub static ref WINDOW_CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedstore_window_cache_hits_total", "Windows served from a cached collection"),
        &["collection"]
    ).expect("metric can be created");
    pub static ref WINDOW_CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedstore_window_cache_misses_total", "Collections fetched from the network"),
        &["collection"]
    ).expect("metric can be created");
    pub static ref STORE_POSTS: IntGauge = IntGauge::new(
        "feedstore_store_posts",
        "Current number of canonical posts in the store"
    ).expect("metric can be created");

    // Visibility Metrics
    pub static ref HIDDEN_POSTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedstore_hidden_posts_total", "Posts excluded by the visibility filter"),
        &["reason"]
    ).expect("metric can be created");

    // Notification Metrics
    pub static ref NOTIFICATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedstore_notifications_total", "User-visible notifications raised"),
        &["level"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(MUTATIONS_TOTAL.clone()))
        .expect("MUTATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FETCHES_TOTAL.clone()))
        .expect("FETCHES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FETCH_DURATION_SECONDS.clone()))
        .expect("FETCH_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(WINDOW_CACHE_HITS_TOTAL.clone()))
        .expect("WINDOW_CACHE_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(WINDOW_CACHE_MISSES_TOTAL.clone()))
        .expect("WINDOW_CACHE_MISSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(STORE_POSTS.clone()))
        .expect("STORE_POSTS can be registered");
    REGISTRY
        .register(Box::new(HIDDEN_POSTS_TOTAL.clone()))
        .expect("HIDDEN_POSTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(NOTIFICATIONS_TOTAL.clone()))
        .expect("NOTIFICATIONS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}

/// Render the registry in the Prometheus text exposition format.
pub fn render() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(error) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(%error, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
