//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mei_friend_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "mei_friend_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Auth Metrics
    pub static ref LOGIN_REDIRECTS_TOTAL: IntCounter = IntCounter::new(
        "mei_friend_login_redirects_total",
        "Total number of redirects to the GitHub authorize page"
    ).expect("metric can be created");
    pub static ref AUTHORIZATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mei_friend_authorizations_total", "Total number of OAuth callbacks handled"),
        &["status"]
    ).expect("metric can be created");
    pub static ref LOGOUTS_TOTAL: IntCounter = IntCounter::new(
        "mei_friend_logouts_total",
        "Total number of logouts"
    ).expect("metric can be created");
    pub static ref GITHUB_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "mei_friend_github_request_duration_seconds",
            "GitHub request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mei_friend_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
            .expect("HTTP_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
            .expect("HTTP_REQUEST_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(LOGIN_REDIRECTS_TOTAL.clone()))
            .expect("LOGIN_REDIRECTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(AUTHORIZATIONS_TOTAL.clone()))
            .expect("AUTHORIZATIONS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(LOGOUTS_TOTAL.clone()))
            .expect("LOGOUTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(GITHUB_REQUEST_DURATION_SECONDS.clone()))
            .expect("GITHUB_REQUEST_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

/// Middleware recording request count and latency per matched route
pub async fn track_http_metrics(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = req.method().to_string();
    // Label by route template so `/static/*` doesn't explode cardinality.
    let endpoint = req
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &endpoint])
        .start_timer();

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, &status])
        .inc();

    timer.observe_duration();

    response
}
