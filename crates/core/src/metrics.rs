//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orders (intake, transitions, preparation time)
//! - Claims (claims, releases, heartbeats)
//! - Broker and notifications

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Order Metrics
// =============================================================================

/// Orders accepted by intake.
pub static ORDERS_CREATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pizzeria_orders_created_total", "Total orders created"),
        &["order_type"], // "dine_in", "delivery"
    )
    .unwrap()
});

/// Orders rejected by intake validation.
pub static ORDERS_REJECTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pizzeria_orders_rejected_total",
        "Total order submissions rejected by validation",
    )
    .unwrap()
});

/// Status transitions by target status.
pub static TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pizzeria_order_transitions_total",
            "Total committed order status transitions",
        ),
        &["status"],
    )
    .unwrap()
});

/// Time from claim to completion.
pub static PREPARATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "pizzeria_preparation_duration_seconds",
            "Duration from claim to completion",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]),
        &["order_type"],
    )
    .unwrap()
});

// =============================================================================
// Claim Metrics
// =============================================================================

/// Claim attempts by result.
pub static CLAIMS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pizzeria_claims_total", "Total claim attempts"),
        &["result"], // "claimed", "conflict", "empty"
    )
    .unwrap()
});

/// Releases by reason.
pub static RELEASES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pizzeria_releases_total", "Total orders released back to the queue"),
        &["reason"], // "worker_timeout", "shutdown", "failure"
    )
    .unwrap()
});

/// Heartbeat writes that failed.
pub static HEARTBEAT_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pizzeria_heartbeat_failures_total",
        "Total failed worker heartbeats",
    )
    .unwrap()
});

/// Workers marked offline by the reaper.
pub static WORKERS_REAPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pizzeria_workers_reaped_total",
        "Total workers marked offline after missing heartbeats",
    )
    .unwrap()
});

// =============================================================================
// Broker Metrics
// =============================================================================

/// Events published by topic.
pub static EVENTS_PUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pizzeria_events_published_total", "Total events published"),
        &["topic"],
    )
    .unwrap()
});

/// Publishes that failed after retries, by topic.
pub static PUBLISH_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pizzeria_publish_failures_total",
            "Total publishes that failed after retries",
        ),
        &["topic"],
    )
    .unwrap()
});

/// Notifications by outcome.
pub static NOTIFICATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pizzeria_notifications_total", "Total notification deliveries"),
        &["outcome"], // "delivered", "duplicate", "dead_letter", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Orders
        Box::new(ORDERS_CREATED.clone()),
        Box::new(ORDERS_REJECTED.clone()),
        Box::new(TRANSITIONS.clone()),
        Box::new(PREPARATION_DURATION.clone()),
        // Claims
        Box::new(CLAIMS.clone()),
        Box::new(RELEASES.clone()),
        Box::new(HEARTBEAT_FAILURES.clone()),
        Box::new(WORKERS_REAPED.clone()),
        // Broker
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(PUBLISH_FAILURES.clone()),
        Box::new(NOTIFICATIONS.clone()),
    ]
}
