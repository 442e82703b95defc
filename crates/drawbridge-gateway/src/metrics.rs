//! Prometheus metrics recording and endpoint.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Outcome of the one install attempt, shared by every caller.
static HANDLE: OnceLock<Result<PrometheusHandle, String>> = OnceLock::new();

/// Install the Prometheus recorder once per process and return its handle.
/// Concurrent callers wait for the same installation.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| e.to_string())
        })
        .clone()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))
}

/// Record a canvas peer joining.
pub fn record_ws_connect() {
    metrics::gauge!("canvas_connections_active").increment(1.0);
}

/// Record a canvas peer leaving.
pub fn record_ws_disconnect() {
    metrics::gauge!("canvas_connections_active").decrement(1.0);
}

/// Record one broadcast of `kind` delivered to `delivered` peers.
pub fn record_broadcast(kind: &str, delivered: usize) {
    let labels = [("kind", kind.to_string())];
    metrics::counter!("canvas_broadcasts_total", &labels).increment(1);
    metrics::counter!("canvas_frames_sent_total", &labels).increment(delivered as u64);
}

/// Record an agent stream starting. Pair with a [`StreamGuard`].
pub fn record_stream_start() {
    metrics::gauge!("agent_streams_active").increment(1.0);
}

/// Decrements the active stream gauge when the response body is dropped.
pub struct StreamGuard;

impl Drop for StreamGuard {
    fn drop(&mut self) {
        metrics::gauge!("agent_streams_active").decrement(1.0);
    }
}

/// Record an error of a given kind.
pub fn record_error(kind: &str) {
    let labels = [("kind", kind.to_string())];
    metrics::counter!("errors_total", &labels).increment(1);
}
