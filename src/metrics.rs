//! Prometheus metrics.
//!
//! Call sites use the `metrics` facade; without an installed recorder (tests)
//! every call is a no-op.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Safe to call more than once.
pub fn init() {
    if HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Render the current metrics, if a recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(PrometheusHandle::render)
}

/// Count a finished proxy request by resource kind and response status.
pub fn record_request(kind: &'static str, status: u16) {
    counter!("hls_relay_requests_total", "kind" => kind, "status" => status.to_string())
        .increment(1);
}

pub fn record_duration(kind: &'static str, start: Instant) {
    histogram!("hls_relay_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("hls_relay_upstream_errors_total", "kind" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_request("playlist", 200);
        record_duration("segment", Instant::now());
        record_upstream_error("segment");
    }
}
