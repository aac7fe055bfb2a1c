//! Prometheus metrics for the notification pipeline.
//!
//! - Composition metrics (notifications composed, deliveries created)
//! - Delivery metrics (attempts by channel and outcome, transport latency)
//! - Sweep metrics (items handled per sweep, sweep duration)
//! - Work queue metrics (enqueues, task-level retries)
//! - Retention metrics (notifications purged)

mod helpers;

pub use helpers::{encode_metrics, ComposeMetrics, DeliveryMetrics, QueueMetrics, SweepMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "notifier";

lazy_static! {
    // ============================================================================
    // Composition Metrics
    // ============================================================================

    /// Notifications composed by notification type
    pub static ref NOTIFICATIONS_COMPOSED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_composed_total", METRIC_PREFIX),
        "Total notifications composed",
        &["type"]
    ).unwrap();

    /// Deliveries created by channel
    pub static ref DELIVERIES_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_deliveries_created_total", METRIC_PREFIX),
        "Total deliveries created",
        &["channel"]
    ).unwrap();

    /// Compositions that failed and were dropped
    pub static ref COMPOSE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_compose_failures_total", METRIC_PREFIX),
        "Total notification compositions that failed"
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Delivery attempts by channel and outcome (sent, failed, exhausted, skipped)
    pub static ref DELIVERY_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivery_attempts_total", METRIC_PREFIX),
        "Total delivery attempts",
        &["channel", "outcome"]
    ).unwrap();

    /// Time spent in the transport call per channel
    pub static ref DELIVERY_DURATION: HistogramVec = register_histogram_vec!(
        format!("{}_delivery_duration_seconds", METRIC_PREFIX),
        "Delivery transport call duration in seconds",
        &["channel"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    // ============================================================================
    // Sweep Metrics
    // ============================================================================

    /// Items handled per sweep and result (processed, failed, skipped, purged)
    pub static ref SWEEP_ITEMS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_sweep_items_total", METRIC_PREFIX),
        "Total items handled by scheduler sweeps",
        &["sweep", "result"]
    ).unwrap();

    /// Sweep run duration
    pub static ref SWEEP_DURATION: HistogramVec = register_histogram_vec!(
        format!("{}_sweep_duration_seconds", METRIC_PREFIX),
        "Scheduler sweep duration in seconds",
        &["sweep"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    /// Sweeps that aborted before processing items (store unavailable)
    pub static ref SWEEP_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_sweep_errors_total", METRIC_PREFIX),
        "Total sweeps that could not load their work set",
        &["sweep"]
    ).unwrap();

    // ============================================================================
    // Work Queue Metrics
    // ============================================================================

    /// Jobs enqueued by backend
    pub static ref QUEUE_ENQUEUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_queue_enqueued_total", METRIC_PREFIX),
        "Total delivery jobs enqueued",
        &["backend"]
    ).unwrap();

    /// Enqueue failures by backend
    pub static ref QUEUE_ENQUEUE_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_queue_enqueue_failures_total", METRIC_PREFIX),
        "Total delivery jobs that could not be enqueued",
        &["backend"]
    ).unwrap();

    /// Jobs waiting in the work queue, refreshed on scrape
    pub static ref QUEUE_DEPTH: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_queue_depth", METRIC_PREFIX),
        "Delivery jobs waiting in the work queue",
        &["backend"]
    ).unwrap();

    /// Task-level re-invocations after infrastructure failures
    pub static ref TASK_RETRIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_task_retries_total", METRIC_PREFIX),
        "Total delivery jobs re-enqueued after an infrastructure failure"
    ).unwrap();

    /// Jobs dropped after exhausting task-level retries
    pub static ref TASK_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_task_dropped_total", METRIC_PREFIX),
        "Total delivery jobs dropped after exhausting task retries"
    ).unwrap();

    // ============================================================================
    // Retention Metrics
    // ============================================================================

    /// Notifications deleted by the cleanup sweep
    pub static ref NOTIFICATIONS_PURGED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_purged_total", METRIC_PREFIX),
        "Total read notifications purged after the retention window"
    ).unwrap();
}
