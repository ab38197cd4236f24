//! Prometheus metrics exposition
//!
//! The exporter is only installed when `[metrics] listen_addr` is configured.
//! Metric names:
//!
//! - `dep_sync_passes_total` (counter): scheduler passes started
//! - `dep_sync_triggers_total` (counter): label `result`
//! - `dep_sync_removals_total` (counter): label `registry`
//! - `dep_sync_removal_runs_total` (counter): label `outcome`

use std::net::SocketAddr;

use enrollment_sync::RemovalOutcome;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{Error, Result};

/// Install the global recorder and serve `/metrics` on `addr`.
///
/// Must be called from within the tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| Error::MetricsExporter {
            addr: addr.to_string(),
            reason: e.to_string(),
        })
}

/// Label for a finished removal run.
pub fn removal_label(outcome: &std::result::Result<RemovalOutcome, enrollment_sync::Error>) -> &'static str {
    match outcome {
        Ok(RemovalOutcome::NothingToRemove) => "nothing_to_remove",
        Ok(RemovalOutcome::Declined) => "declined",
        Ok(RemovalOutcome::Completed(_)) => "completed",
        Err(enrollment_sync::Error::VerificationFailed { .. })
        | Err(enrollment_sync::Error::VerificationRead { .. }) => "verification_failed",
        Err(_) => "error",
    }
}

/// Record a finished removal run.
pub fn record_removal(outcome: &std::result::Result<RemovalOutcome, enrollment_sync::Error>) {
    metrics::counter!("dep_sync_removal_runs_total", "outcome" => removal_label(outcome))
        .increment(1);
}
