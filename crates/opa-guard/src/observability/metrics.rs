//! Metrics definitions for the guard.
//!
//! All metrics follow Prometheus naming conventions:
//! - `guard_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `status`: 2 values (success, error) for reloads; 4 for policy calls
//! - `transport`: 2 values (http, grpc)
//! - `outcome`: 3 values (admitted, bypassed, denied)
//! - `reason`: bounded by `GuardError::reason`
//!
//! Recording without an installed recorder is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle for `/metrics`.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Policy calls are bounded by a sub-second timeout
        .set_buckets_for_metric(
            Matcher::Full("guard_policy_request_duration_seconds".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set policy request buckets: {e}"))?
        // Key reloads cross the network, one or two round trips per source
        .set_buckets_for_metric(
            Matcher::Full("guard_key_reload_duration_seconds".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set key reload buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Key Cache Metrics
// ============================================================================

/// Record one key reload.
///
/// Metric: `guard_key_reloads_total`, `guard_key_reload_duration_seconds`
/// Labels: `status`
pub fn record_key_reload(status: &str, duration: Duration) {
    histogram!("guard_key_reload_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());
    counter!("guard_key_reloads_total", "status" => status.to_string()).increment(1);
}

/// Metric: `guard_loaded_keys`
pub fn set_loaded_keys(count: usize) {
    gauge!("guard_loaded_keys").set(count as f64);
}

// ============================================================================
// Policy Metrics
// ============================================================================

/// Record one policy evaluation round trip.
///
/// Metric: `guard_policy_requests_total`, `guard_policy_request_duration_seconds`
/// Labels: `status` (allowed, forbidden, unavailable, result_missing)
pub fn record_policy_request(status: &str, duration: Duration) {
    histogram!("guard_policy_request_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());
    counter!("guard_policy_requests_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// Guard Decision Metrics
// ============================================================================

/// Record the final decision for one call.
///
/// Metric: `guard_decisions_total`
/// Labels: `transport`, `outcome`, `reason`
pub fn record_decision(transport: &str, outcome: &str, reason: &str) {
    counter!("guard_decisions_total",
        "transport" => transport.to_string(),
        "outcome" => outcome.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}
