//! Prometheus metrics for the authentication subsystem.
//!
//! Metrics are exposed on a dedicated listener (default `0.0.0.0:9090`),
//! separate from the API port.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `privacy_tokens_issued_total` - Bearer credentials issued
//! - `privacy_tokens_verified_total` - Successful verifications (label: key_position)
//! - `privacy_auth_failures_total` - Rejected requests (label: kind)
//! - `privacy_requests_authenticated_total` - Signed requests accepted
//! - `privacy_rate_limited_total` - Requests rejected by the rate limiter (label: route)
//!
//! ## Histograms
//! - `privacy_request_duration_seconds` - Request duration (labels: method, status)
//!
//! ## Gauges
//! - `privacy_nonce_ledger_entries` - Nonces currently held by the in-memory ledger
//!
//! A `key_position="retired"` sample on the verification counter means some
//! client still holds a credential signed before the last rotation; once it
//! stays flat for the credential lifetime, the retired secret can be dropped.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const TOKENS_ISSUED_TOTAL: &str = "privacy_tokens_issued_total";
    pub const TOKENS_VERIFIED_TOTAL: &str = "privacy_tokens_verified_total";
    pub const AUTH_FAILURES_TOTAL: &str = "privacy_auth_failures_total";
    pub const REQUESTS_AUTHENTICATED_TOTAL: &str = "privacy_requests_authenticated_total";
    pub const RATE_LIMITED_TOTAL: &str = "privacy_rate_limited_total";
    pub const REQUEST_DURATION_SECONDS: &str = "privacy_request_duration_seconds";
    pub const NONCE_LEDGER_ENTRIES: &str = "privacy_nonce_ledger_entries";
}

/// Install the Prometheus exporter and describe every metric.
///
/// # Errors
///
/// Returns a message when the exporter cannot be installed (port in use, or
/// a recorder is already set).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::TOKENS_ISSUED_TOTAL,
        "Total number of bearer credentials issued"
    );
    describe_counter!(
        names::TOKENS_VERIFIED_TOTAL,
        "Total number of bearer credentials verified, by registry key position"
    );
    describe_counter!(
        names::AUTH_FAILURES_TOTAL,
        "Total number of rejected requests, by failure kind"
    );
    describe_counter!(
        names::REQUESTS_AUTHENTICATED_TOTAL,
        "Total number of signed requests accepted"
    );
    describe_counter!(
        names::RATE_LIMITED_TOTAL,
        "Total number of requests rejected by the rate limiter"
    );
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        names::NONCE_LEDGER_ENTRIES,
        "Number of nonces currently held by the in-memory ledger"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counters
// =============================================================================

pub fn record_token_issued() {
    counter!(names::TOKENS_ISSUED_TOTAL).increment(1);
}

/// Record a successful verification; `key_position` is `"active"` or `"retired"`.
pub fn record_token_verified(key_position: &'static str) {
    counter!(names::TOKENS_VERIFIED_TOTAL, "key_position" => key_position).increment(1);
}

pub fn record_auth_failure(kind: &'static str) {
    counter!(names::AUTH_FAILURES_TOTAL, "kind" => kind).increment(1);
}

pub fn record_request_authenticated() {
    counter!(names::REQUESTS_AUTHENTICATED_TOTAL).increment(1);
}

pub fn record_rate_limited(route: &'static str) {
    counter!(names::RATE_LIMITED_TOTAL, "route" => route).increment(1);
}

// =============================================================================
// Histograms & Gauges
// =============================================================================

pub fn record_request_duration(method: &str, status: u16, duration_secs: f64) {
    histogram!(
        names::REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .record(duration_secs);
}

pub fn set_nonce_ledger_entries(entries: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!(names::NONCE_LEDGER_ENTRIES).set(entries as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed recorder is a no-op; these only check
    // that label construction doesn't panic.

    #[test]
    fn test_record_counters_without_recorder() {
        record_token_issued();
        record_token_verified("active");
        record_token_verified("retired");
        record_auth_failure("nonce_reused");
        record_request_authenticated();
        record_rate_limited("auth");
    }

    #[test]
    fn test_record_duration_and_gauge_without_recorder() {
        record_request_duration("POST", 200, 0.012);
        set_nonce_ledger_entries(42);
    }
}
