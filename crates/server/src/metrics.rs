//! Prometheus metrics for the HTTP surface.
//!
//! The registry also carries every pipeline metric defined in
//! `pizzeria_core::metrics`, so `/metrics` exposes the whole process.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use pizzeria_core::WorkerStatus;
use tracing::warn;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "pizzeria_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pizzeria_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "pizzeria_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Order Metrics
// =============================================================================

/// Orders by current status (collected dynamically).
pub static ORDERS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("pizzeria_orders_by_status", "Current order count by status"),
        &["status"],
    )
    .unwrap()
});

/// Workers whose heartbeat is inside the liveness window (collected dynamically).
pub static WORKERS_LIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "pizzeria_workers_live",
        "Workers currently considered online",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    // Orders and workers
    registry
        .register(Box::new(ORDERS_BY_STATUS.clone()))
        .unwrap();
    registry.register(Box::new(WORKERS_LIVE.clone())).unwrap();

    // Core metrics (intake, claims, kitchen, broker, notifications)
    for metric in pizzeria_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Refresh the gauges that mirror store state.
///
/// Called right before encoding. Store errors leave the previous values.
pub fn collect_dynamic_metrics(state: &AppState) {
    let tracking = state.tracking();

    match tracking.count_by_status() {
        Ok(counts) => {
            for (status, count) in counts {
                ORDERS_BY_STATUS
                    .with_label_values(&[status.as_str()])
                    .set(count);
            }
        }
        Err(e) => warn!(
            service = "api",
            action = "collect_metrics",
            "Order counts unavailable: {}",
            e
        ),
    }

    match tracking.list_workers() {
        Ok(workers) => {
            let live = workers
                .iter()
                .filter(|w| w.effective_status != WorkerStatus::Offline)
                .count();
            WORKERS_LIVE.set(live as i64);
        }
        Err(e) => warn!(
            service = "api",
            action = "collect_metrics",
            "Worker list unavailable: {}",
            e
        ),
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    // Two passes so adjacent numeric segments are both replaced
    let result = numeric_regex.replace_all(path, "/{id}$1");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}
