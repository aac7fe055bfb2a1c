//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::notification::{Channel, NotificationType};

use super::{
    COMPOSE_FAILURES_TOTAL, DELIVERIES_CREATED_TOTAL, DELIVERY_ATTEMPTS_TOTAL, DELIVERY_DURATION,
    NOTIFICATIONS_COMPOSED_TOTAL, NOTIFICATIONS_PURGED_TOTAL, QUEUE_DEPTH, QUEUE_ENQUEUED_TOTAL,
    QUEUE_ENQUEUE_FAILURES_TOTAL, SWEEP_DURATION, SWEEP_ERRORS_TOTAL, SWEEP_ITEMS_TOTAL,
    TASK_DROPPED_TOTAL, TASK_RETRIES_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for composition metrics
pub struct ComposeMetrics;

impl ComposeMetrics {
    pub fn record_composed(notification_type: NotificationType) {
        NOTIFICATIONS_COMPOSED_TOTAL
            .with_label_values(&[notification_type.as_str()])
            .inc();
    }

    pub fn record_delivery_created(channel: Channel) {
        DELIVERIES_CREATED_TOTAL
            .with_label_values(&[channel.as_str()])
            .inc();
    }

    pub fn record_failure() {
        COMPOSE_FAILURES_TOTAL.inc();
    }
}

/// Helper struct for delivery attempt metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    pub fn record_sent(channel: Channel) {
        DELIVERY_ATTEMPTS_TOTAL
            .with_label_values(&[channel.as_str(), "sent"])
            .inc();
    }

    /// Record a failed attempt; `exhausted` when no further retry is scheduled
    pub fn record_failed(channel: Channel, exhausted: bool) {
        let outcome = if exhausted { "exhausted" } else { "failed" };
        DELIVERY_ATTEMPTS_TOTAL
            .with_label_values(&[channel.as_str(), outcome])
            .inc();
    }

    pub fn record_skipped(channel: Channel) {
        DELIVERY_ATTEMPTS_TOTAL
            .with_label_values(&[channel.as_str(), "skipped"])
            .inc();
    }

    pub fn record_duration(channel: Channel, duration_secs: f64) {
        DELIVERY_DURATION
            .with_label_values(&[channel.as_str()])
            .observe(duration_secs);
    }
}

/// Helper struct for scheduler sweep metrics
pub struct SweepMetrics;

impl SweepMetrics {
    pub fn record_items(sweep: &str, result: &str, count: u64) {
        if count > 0 {
            SWEEP_ITEMS_TOTAL
                .with_label_values(&[sweep, result])
                .inc_by(count);
        }
    }

    pub fn record_duration(sweep: &str, duration_secs: f64) {
        SWEEP_DURATION
            .with_label_values(&[sweep])
            .observe(duration_secs);
    }

    pub fn record_error(sweep: &str) {
        SWEEP_ERRORS_TOTAL.with_label_values(&[sweep]).inc();
    }

    pub fn record_purged(count: u64) {
        NOTIFICATIONS_PURGED_TOTAL.inc_by(count);
    }
}

/// Helper struct for work queue metrics
pub struct QueueMetrics;

impl QueueMetrics {
    pub fn record_enqueued(backend: &str) {
        QUEUE_ENQUEUED_TOTAL.with_label_values(&[backend]).inc();
    }

    pub fn record_enqueue_failed(backend: &str) {
        QUEUE_ENQUEUE_FAILURES_TOTAL
            .with_label_values(&[backend])
            .inc();
    }

    pub fn record_task_retry() {
        TASK_RETRIES_TOTAL.inc();
    }

    pub fn record_task_dropped() {
        TASK_DROPPED_TOTAL.inc();
    }

    pub fn set_depth(backend: &str, depth: usize) {
        QUEUE_DEPTH.with_label_values(&[backend]).set(depth as i64);
    }
}
