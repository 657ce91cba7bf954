//! Metrics module for entitlement-service.
//! Provides Prometheus metrics for entitlement decisions and storage calls.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "entitlement_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Authorization decision counter
pub static DECISIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Subscription operations counter
pub static SUBSCRIPTION_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Usage increments counter
pub static USAGE_INCREMENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    DECISIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "entitlement_decisions_total",
                "Authorization decisions by product line, feature and outcome"
            ),
            &["product_line", "feature", "outcome"]
        )
        .expect("Failed to register DECISIONS_TOTAL")
    });

    SUBSCRIPTION_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "entitlement_subscription_operations_total",
                "Subscription operations by product line and operation type"
            ),
            &["product_line", "operation"]
        )
        .expect("Failed to register SUBSCRIPTION_OPERATIONS_TOTAL")
    });

    USAGE_INCREMENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "entitlement_usage_increments_total",
                "Successful metered spends by feature"
            ),
            &["feature"]
        )
        .expect("Failed to register USAGE_INCREMENTS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}

/// Record an authorization decision.
pub fn record_decision(product_line: &str, feature: &str, outcome: &str) {
    if let Some(counter) = DECISIONS_TOTAL.get() {
        counter
            .with_label_values(&[product_line, feature, outcome])
            .inc();
    }
}

/// Record a subscription operation.
pub fn record_subscription_operation(product_line: &str, operation: &str) {
    if let Some(counter) = SUBSCRIPTION_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[product_line, operation]).inc();
    }
}

/// Record a successful metered spend.
pub fn record_usage_increment(feature: &str) {
    if let Some(counter) = USAGE_INCREMENTS_TOTAL.get() {
        counter.with_label_values(&[feature]).inc();
    }
}
