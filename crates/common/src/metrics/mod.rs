//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming under the `fooddrop_` prefix.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all FoodDrop metrics
pub const METRICS_PREFIX: &str = "fooddrop";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms - argon2 verification lands around here
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Identity metrics
    describe_counter!(
        format!("{}_sign_ins_total", METRICS_PREFIX),
        Unit::Count,
        "Password sign-in attempts by outcome"
    );

    describe_counter!(
        format!("{}_bootstrap_total", METRICS_PREFIX),
        Unit::Count,
        "Session bootstrap runs by destination"
    );

    describe_counter!(
        format!("{}_sessions_revoked_total", METRICS_PREFIX),
        Unit::Count,
        "Sessions signed out by the fail-closed path"
    );

    // Restaurant metrics
    describe_counter!(
        format!("{}_restaurant_writes_total", METRICS_PREFIX),
        Unit::Count,
        "Restaurant rows created or deleted"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a password sign-in attempt
pub fn record_sign_in(success: bool) {
    let outcome = if success { "success" } else { "rejected" };

    counter!(
        format!("{}_sign_ins_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a bootstrap run
pub fn record_bootstrap(destination: &'static str, signed_out: bool) {
    counter!(
        format!("{}_bootstrap_total", METRICS_PREFIX),
        "destination" => destination
    )
    .increment(1);

    if signed_out {
        counter!(format!("{}_sessions_revoked_total", METRICS_PREFIX)).increment(1);
    }
}

/// Record a restaurant write (`created` or `deleted`)
pub fn record_restaurant_write(operation: &'static str) {
    counter!(
        format!("{}_restaurant_writes_total", METRICS_PREFIX),
        "operation" => operation
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every helper must be a no-op
        let metrics = RequestMetrics::start("GET", "/");
        metrics.finish(303);
        record_sign_in(true);
        record_bootstrap("login", true);
        record_restaurant_write("created");
    }
}
