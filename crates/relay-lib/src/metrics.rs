// ==============
// relay-lib/src/metrics.rs
// ==============
//! Connection and message metrics.
//!
//! `RelayMetrics` is the single mutation point: the gauge, counter, and
//! histogram move only through its methods, which also publish to the
//! `metrics` facade so the Prometheus recorder can render them at
//! `/metrics`. `snapshot` exposes a read-only copy.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// Live connections (gauge).
pub const SOCKET_CONNECTIONS: &str = "socket_connections_total";
/// Messages received (counter).
pub const MESSAGES_RECEIVED: &str = "socket_messages_received_total";
/// Message processing latency in seconds (histogram).
pub const MESSAGE_LATENCY_SECONDS: &str = "socket_message_latency_seconds";

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

#[derive(Default)]
pub struct RelayMetrics {
    connections: AtomicI64,
    messages_received: AtomicU64,
    latency_observations: AtomicU64,
    latency_sum_micros: AtomicU64,
}

/// Point-in-time, read-only view of the collected metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub live_connections: i64,
    pub messages_received: u64,
    pub latency_observations: u64,
    pub latency_sum_seconds: f64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session completed its initial room joins.
    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
        gauge!(SOCKET_CONNECTIONS).increment(1.0);
    }

    /// A session terminated.
    pub fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
        gauge!(SOCKET_CONNECTIONS).decrement(1.0);
    }

    /// One inbound frame was parsed, recognized or not.
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        counter!(MESSAGES_RECEIVED).increment(1);
    }

    /// One frame finished routing; latency is receipt → broadcast completion.
    pub fn observe_latency(&self, elapsed: Duration) {
        self.latency_observations.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        histogram!(MESSAGE_LATENCY_SECONDS).record(elapsed.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            live_connections: self.connections.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            latency_observations: self.latency_observations.load(Ordering::Relaxed),
            latency_sum_seconds: self.latency_sum_micros.load(Ordering::Relaxed) as f64 / 1e6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_tracks_open_and_close() {
        let metrics = RelayMetrics::new();
        metrics.connection_opened();
        metrics.connection_opened();
        assert_eq!(metrics.snapshot().live_connections, 2);

        metrics.connection_closed();
        assert_eq!(metrics.snapshot().live_connections, 1);
    }

    #[test]
    fn test_counter_and_histogram_accumulate() {
        let metrics = RelayMetrics::new();
        metrics.message_received();
        metrics.message_received();
        metrics.observe_latency(Duration::from_millis(2));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_received, 2);
        assert_eq!(snapshot.latency_observations, 1);
        assert!(snapshot.latency_sum_seconds >= 0.0);
    }

    #[test]
    fn test_render_without_global_install() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn test_metric_names_are_prometheus_friendly() {
        for name in [SOCKET_CONNECTIONS, MESSAGES_RECEIVED, MESSAGE_LATENCY_SECONDS] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
