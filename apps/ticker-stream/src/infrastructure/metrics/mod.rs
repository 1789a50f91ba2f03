//! Prometheus Metrics Module
//!
//! Venue-labelled counters and gauges for the ingestion path.
//!
//! # Metrics Categories
//!
//! - **Frames**: Frames and bytes received, frames dropped by reason
//! - **Tickers**: Updates delivered to the listener
//! - **Connections**: Connection state, heartbeats, reconnects
//! - **Latency**: Frame processing time
//!
//! Recording is a no-op until a recorder is installed, so library users who
//! never call [`init_metrics`] pay nothing.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::session::{ConnectionState, Venue};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Metrics initialization error.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The Prometheus exporter could not be built or installed.
    #[error("failed to install Prometheus exporter: {0}")]
    Build(#[from] BuildError),
}

/// Install the Prometheus recorder.
///
/// With a non-zero `port` an HTTP listener serves `/metrics` on
/// `0.0.0.0:port` (requires a running Tokio runtime). With `port == 0` only
/// the recorder is installed and [`metrics_handle`] renders on demand.
/// Later calls are no-ops.
///
/// # Errors
///
/// Returns [`MetricsError`] if the exporter cannot be installed.
pub fn init_metrics(port: u16) -> Result<(), MetricsError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let builder = PrometheusBuilder::new();
    let handle = if port == 0 {
        Some(builder.install_recorder()?)
    } else {
        builder
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .install()?;
        None
    };

    let _ = PROMETHEUS_HANDLE.set(handle);
    register_metrics();
    Ok(())
}

/// Handle for rendering metrics when installed without a listener.
#[must_use]
pub fn metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned().flatten()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "ticker_stream_frames_received_total",
        "Total data frames received from venues"
    );
    describe_counter!(
        "ticker_stream_bytes_received_total",
        "Total payload bytes received from venues"
    );
    describe_counter!(
        "ticker_stream_tickers_delivered_total",
        "Total display updates handed to listeners"
    );
    describe_counter!(
        "ticker_stream_frames_dropped_total",
        "Total frames dropped by reason"
    );

    describe_gauge!(
        "ticker_stream_connection_state",
        "Connection state (0 disconnected, 1 connecting, 2 subscribed, 3 degraded)"
    );
    describe_counter!(
        "ticker_stream_heartbeats_sent_total",
        "Total heartbeat probes sent"
    );
    describe_counter!(
        "ticker_stream_reconnects_total",
        "Total reconnection attempts"
    );

    describe_histogram!(
        "ticker_stream_frame_processing_seconds",
        "Time from frame receipt to listener hand-off"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

const fn state_value(state: ConnectionState) -> f64 {
    match state {
        ConnectionState::Disconnected => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Subscribed => 2.0,
        ConnectionState::Degraded => 3.0,
    }
}

/// Record a data frame and its size.
pub fn record_frame_received(venue: Venue, bytes: u64) {
    counter!("ticker_stream_frames_received_total", "venue" => venue.as_str()).increment(1);
    counter!("ticker_stream_bytes_received_total", "venue" => venue.as_str()).increment(bytes);
}

/// Record an update delivered to the listener.
pub fn record_ticker_delivered(venue: Venue) {
    counter!("ticker_stream_tickers_delivered_total", "venue" => venue.as_str()).increment(1);
}

/// Record a dropped frame.
pub fn record_frame_dropped(venue: Venue, reason: &'static str) {
    counter!(
        "ticker_stream_frames_dropped_total",
        "venue" => venue.as_str(),
        "reason" => reason
    )
    .increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(venue: Venue, state: ConnectionState) {
    gauge!("ticker_stream_connection_state", "venue" => venue.as_str()).set(state_value(state));
}

/// Record a heartbeat probe.
pub fn record_heartbeat_sent(venue: Venue) {
    counter!("ticker_stream_heartbeats_sent_total", "venue" => venue.as_str()).increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect(venue: Venue) {
    counter!("ticker_stream_reconnects_total", "venue" => venue.as_str()).increment(1);
}

/// Record frame processing duration.
pub fn record_processing_duration(venue: Venue, duration: Duration) {
    histogram!("ticker_stream_frame_processing_seconds", "venue" => venue.as_str())
        .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_values_are_distinct() {
        let values = [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Subscribed,
            ConnectionState::Degraded,
        ]
        .map(state_value);
        assert_eq!(values, [0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn recorder_renders_venue_labels() {
        init_metrics(0).unwrap();
        record_frame_received(Venue::Okx, 128);
        record_frame_dropped(Venue::Binance, "json");

        let rendered = metrics_handle().unwrap().render();
        assert!(rendered.contains("ticker_stream_bytes_received_total{venue=\"okx\"}"));
        assert!(rendered.contains("reason=\"json\""));
    }
}
