// crates/server/src/metrics.rs
//! Prometheus recorder for the job metrics emitted by `docflow-jobs`.
//!
//! The jobs crate records through the `metrics` facade; this module installs
//! the recorder, describes the series and renders them for `GET /metrics`.

use std::sync::OnceLock;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder.
///
/// Returns `false` if a recorder was already installed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("Failed to set global metrics recorder (already set)");
        return false;
    }

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Failed to store Prometheus handle (already set)");
    }

    describe_metrics();

    tracing::info!("Prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!(
        "docflow_jobs_started_total",
        "Jobs accepted and handed to a worker"
    );
    describe_counter!(
        "docflow_jobs_completed_total",
        "Jobs that reached a terminal state, by status"
    );
    describe_gauge!(
        "docflow_job_subscribers",
        "Event stream subscribers currently attached"
    );
    describe_histogram!(
        "docflow_job_duration_seconds",
        Unit::Seconds,
        "Time from job creation to terminal state"
    );
}

/// Render current metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}
