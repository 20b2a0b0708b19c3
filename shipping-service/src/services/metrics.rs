//! Prometheus metrics for shipping-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Status transitions by order type, target state and outcome.
pub static ORDER_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "shipping_order_transitions_total",
        "Total number of order status transitions",
        &["order_type", "to_status", "outcome"]
    )
    .expect("Failed to register order_transitions_total")
});

/// Ledger writes by movement kind and outcome (recorded, already_recorded, removed).
pub static LEDGER_WRITES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "shipping_ledger_writes_total",
        "Total number of inventory ledger writes",
        &["kind", "outcome"]
    )
    .expect("Failed to register ledger_writes_total")
});

/// Order number allocation retries after a uniqueness collision.
pub static SEQUENCE_RETRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "shipping_sequence_retries_total",
        "Total number of order number allocation retries",
        &["reason"]
    )
    .expect("Failed to register sequence_retries_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "shipping_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "shipping_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&ORDER_TRANSITIONS_TOTAL);
    Lazy::force(&LEDGER_WRITES_TOTAL);
    Lazy::force(&SEQUENCE_RETRIES_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
    service_core::middleware::metrics::init_http_metrics();
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
