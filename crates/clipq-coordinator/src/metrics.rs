//! Prometheus metrics for the coordinator.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use clipq_models::FailureKind;

use crate::error::{CoordinatorError, CoordinatorResult};

/// Install the Prometheus recorder and serve it on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> CoordinatorResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| CoordinatorError::config(format!("metrics exporter: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_ENQUEUED_TOTAL: &str = "clipq_jobs_enqueued_total";
    pub const JOBS_FINISHED_TOTAL: &str = "clipq_jobs_finished_total";
    pub const JOBS_FAILED_TOTAL: &str = "clipq_jobs_failed_total";
    pub const JOBS_MISSING_TOTAL: &str = "clipq_jobs_missing_total";
    pub const CLIPS_SKIPPED_TOTAL: &str = "clipq_clips_skipped_total";
    pub const JOBS_IN_FLIGHT: &str = "clipq_jobs_in_flight";
}

pub fn record_enqueued() {
    counter!(names::JOBS_ENQUEUED_TOTAL).increment(1);
}

pub fn record_finished() {
    counter!(names::JOBS_FINISHED_TOTAL).increment(1);
}

pub fn record_failed(kind: FailureKind) {
    counter!(names::JOBS_FAILED_TOTAL, "kind" => kind.as_str()).increment(1);
}

pub fn record_missing() {
    counter!(names::JOBS_MISSING_TOTAL).increment(1);
}

pub fn record_skipped(count: u64) {
    counter!(names::CLIPS_SKIPPED_TOTAL).increment(count);
}

pub fn set_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}
