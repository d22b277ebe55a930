//! Prometheus metrics for failed messages and retries

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize Prometheus metrics
///
/// Call this once at startup. Subsequent calls are no-ops. Returns false if
/// another recorder was already installed.
pub fn init_metrics() -> bool {
    PROMETHEUS_HANDLE
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new().install_recorder()?;
            info!("Prometheus metrics initialized");
            Ok::<_, metrics_exporter_prometheus::BuildError>(handle)
        })
        .map_err(|e| warn!(error = %e, "Failed to install Prometheus recorder"))
        .is_ok()
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus format
pub fn render_metrics() -> String {
    prometheus_handle()
        .map(|h| h.render())
        .unwrap_or_default()
}

/// Outcome label of a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStatus {
    Success,
    Failed,
    Skipped,
}

impl RetryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryStatus::Success => "success",
            RetryStatus::Failed => "failed",
            RetryStatus::Skipped => "skipped",
        }
    }
}

/// Failed message metrics helper
#[derive(Clone, Default)]
pub struct FailureMetrics;

impl FailureMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Record a failure being stored
    pub fn failure_stored(&self, stream: &str, receiver: &str) {
        counter!(
            "stream_failures_stored_total",
            "stream" => stream.to_string(),
            "receiver" => receiver.to_string()
        )
        .increment(1);
    }

    /// Record the end of a retry attempt
    pub fn retry_finished(&self, stream: &str, status: RetryStatus, duration: Duration) {
        counter!(
            "stream_failures_retries_total",
            "stream" => stream.to_string(),
            "status" => status.as_str()
        )
        .increment(1);

        histogram!(
            "stream_failures_retry_duration_seconds",
            "stream" => stream.to_string()
        )
        .record(duration.as_secs_f64());
    }

    /// Record a stored failure being removed
    pub fn failure_removed(&self, stream: &str) {
        counter!(
            "stream_failures_removed_total",
            "stream" => stream.to_string()
        )
        .increment(1);
    }

    /// Update the outstanding failures gauge
    pub fn outstanding(&self, count: usize) {
        gauge!("stream_failures_outstanding").set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_status_labels() {
        assert_eq!(RetryStatus::Success.as_str(), "success");
        assert_eq!(RetryStatus::Failed.as_str(), "failed");
        assert_eq!(RetryStatus::Skipped.as_str(), "skipped");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = FailureMetrics::new();
        metrics.failure_stored("foo.bar", "LocalListener");
        metrics.retry_finished("foo.bar", RetryStatus::Success, Duration::from_millis(5));
        metrics.failure_removed("foo.bar");
        metrics.outstanding(3);
    }
}
