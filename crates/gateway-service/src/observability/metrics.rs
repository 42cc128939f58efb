//! Metrics definitions for the auth gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gw_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! The gateway proxies arbitrary paths, so no metric carries a path label.
//! Remaining labels are bounded:
//! - `method`: standard HTTP methods, anything else is `OTHER`
//! - `status`: success, client_error, error, timeout
//! - `outcome`: allowed, denied
//! - `kind`: bounded by `ErrorKind`
//! - `backend`: postgres, rest, mock

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gw_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
                30.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Store lookups sit on every request's critical path
        .set_buckets_for_metric(
            Matcher::Prefix("gw_store_lookup".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set store lookup buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gw_upstream_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
                25.000,
            ],
        )
        .map_err(|e| format!("Failed to set upstream request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion on the gateway listener.
///
/// Metric: `gw_http_requests_total`, `gw_http_request_duration_seconds`
/// Labels: `method`, `status` (and `status_code` on the counter)
pub fn record_http_request(method: &str, status_code: u16, duration: Duration) {
    let method = normalize_method(method);
    let status = categorize_status_code(status_code);

    histogram!("gw_http_request_duration_seconds",
        "method" => method,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("gw_http_requests_total",
        "method" => method,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        100..=399 => "success",
        408 | 504 => "timeout",
        400..=499 => "client_error",
        _ => "error",
    }
}

fn normalize_method(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "PATCH" => "PATCH",
        "DELETE" => "DELETE",
        "HEAD" => "HEAD",
        "OPTIONS" => "OPTIONS",
        _ => "OTHER",
    }
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record an authentication decision.
///
/// Metric: `gw_auth_decisions_total`
/// Labels: `outcome` (allowed/denied), `kind` (error kind, `none` when allowed)
pub fn record_auth_decision(outcome: &'static str, kind: &'static str) {
    counter!("gw_auth_decisions_total",
        "outcome" => outcome,
        "kind" => kind
    )
    .increment(1);
}

/// Record a token store lookup.
///
/// Metric: `gw_store_lookup_duration_seconds`, `gw_store_lookups_total`
/// Labels: `backend`, `status`
pub fn record_store_lookup(backend: &'static str, status: &'static str, duration: Duration) {
    histogram!("gw_store_lookup_duration_seconds",
        "backend" => backend,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("gw_store_lookups_total",
        "backend" => backend,
        "status" => status
    )
    .increment(1);
}

// ============================================================================
// Upstream Metrics
// ============================================================================

/// Record an upstream call.
///
/// Metric: `gw_upstream_request_duration_seconds`
/// Labels: `status` (upstream status code, or timeout/unavailable)
pub fn record_upstream_request(status: &str, duration: Duration) {
    histogram!("gw_upstream_request_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());
}
