use axum_prometheus::metrics::Counter;

pub const COUNTER_INCREMENTS: &str = "counter_increments_total";
pub const STORE_HEALTH_FAILURES: &str = "store_health_failures_total";

/// Gets a prometheus counter
pub fn metric_counter(name: &'static str) -> Counter {
    axum_prometheus::metrics::counter!(name)
}

pub(crate) fn record_increment() {
    metric_counter(COUNTER_INCREMENTS).increment(1);
}

pub(crate) fn record_health_failure() {
    metric_counter(STORE_HEALTH_FAILURES).increment(1);
}
