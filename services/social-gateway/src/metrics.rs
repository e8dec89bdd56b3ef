//! Prometheus metrics exposition
//!
//! Service-level metrics:
//!
//! - `gateway_requests_total` (counter): label `outcome`
//! - `gateway_request_duration_seconds` (histogram): label `outcome`
//!
//! The pool itself emits `keypool_requests_total`,
//! `keypool_quarantines_total`, and `keypool_reactivations_total`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Configures `gateway_request_duration_seconds` with explicit buckets so it
/// renders as a histogram (`_bucket` lines for `histogram_quantile()`) rather
/// than the default summary. Boundaries cover 5ms to 60s, the configurable
/// timeout range.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "gateway_request_duration_seconds".to_string(),
            ),
            &[
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
            ],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed relay request with its outcome label.
pub fn record_relay(outcome: &str, duration_secs: f64) {
    metrics::counter!("gateway_requests_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}
