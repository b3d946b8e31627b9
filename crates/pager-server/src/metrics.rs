//! Metrics collection and export for Pager.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use pager_core::PublishReport;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const STREAMS_TOTAL: &str = "pager_streams_total";
    pub const STREAMS_ACTIVE: &str = "pager_streams_active";
    pub const MESSAGES_PUBLISHED: &str = "pager_messages_published_total";
    pub const FRAMES_DELIVERED: &str = "pager_frames_delivered_total";
    pub const REJECTIONS_TOTAL: &str = "pager_rejections_total";
    pub const LAGGED_TOTAL: &str = "pager_lagged_subscribers_total";
    pub const STORE_ERRORS_TOTAL: &str = "pager_store_errors_total";
    pub const PUBLISH_LATENCY_SECONDS: &str = "pager_publish_latency_seconds";
}

/// Describe every metric to the installed recorder.
///
/// Descriptions sent before a recorder is installed are discarded.
pub fn describe_metrics() {
    metrics::describe_counter!(
        names::STREAMS_TOTAL,
        "Total number of event streams opened since server start"
    );
    metrics::describe_gauge!(names::STREAMS_ACTIVE, "Current number of open event streams");
    metrics::describe_counter!(
        names::MESSAGES_PUBLISHED,
        "Total number of messages accepted and broadcast"
    );
    metrics::describe_counter!(
        names::FRAMES_DELIVERED,
        "Total number of events handed to subscribers"
    );
    metrics::describe_counter!(
        names::REJECTIONS_TOTAL,
        "Total number of publish bodies rejected by validation"
    );
    metrics::describe_counter!(
        names::LAGGED_TOTAL,
        "Events dropped because a subscriber's buffer was full"
    );
    metrics::describe_counter!(names::STORE_ERRORS_TOTAL, "Total number of store failures");
    metrics::describe_histogram!(
        names::PUBLISH_LATENCY_SECONDS,
        "Publish pipeline latency in seconds"
    );

    info!("Metrics described");
}

/// Install the Prometheus recorder and start its HTTP listener.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();

    info!("Metrics server listening on {}", addr);
    Ok(())
}

fn record_stream_opened() {
    counter!(names::STREAMS_TOTAL).increment(1);
    gauge!(names::STREAMS_ACTIVE).increment(1.0);
}

fn record_stream_closed() {
    gauge!(names::STREAMS_ACTIVE).decrement(1.0);
}

/// Record an accepted publish and its fan-out.
pub fn record_published(report: &PublishReport, seconds: f64) {
    counter!(names::MESSAGES_PUBLISHED).increment(1);
    counter!(names::FRAMES_DELIVERED).increment(report.delivered as u64);
    if report.lagged > 0 {
        counter!(names::LAGGED_TOTAL).increment(report.lagged as u64);
    }
    histogram!(names::PUBLISH_LATENCY_SECONDS).record(seconds);
}

/// Record a rejected publish body.
pub fn record_rejection(reason: &'static str) {
    counter!(names::REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

/// Record a store failure.
pub fn record_store_error(operation: &'static str) {
    counter!(names::STORE_ERRORS_TOTAL, "operation" => operation).increment(1);
}

/// Metrics guard that records the stream closing on drop.
#[derive(Debug)]
pub struct StreamMetricsGuard;

impl StreamMetricsGuard {
    /// Create a new metrics guard, recording an opened stream.
    #[must_use]
    pub fn new() -> Self {
        record_stream_opened();
        Self
    }
}

impl Default for StreamMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StreamMetricsGuard {
    fn drop(&mut self) {
        record_stream_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_guard() {
        // No recorder is installed; recording must be a no-op.
        let _guard = StreamMetricsGuard::new();
        record_rejection("empty_message");
        record_published(&PublishReport::default(), 0.001);
    }

    #[test]
    fn test_descriptions_reach_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            record_rejection("empty_message");
        });

        let rendered = handle.render();
        assert!(rendered.contains("# HELP pager_rejections_total"));
        assert!(rendered.contains("pager_rejections_total{reason=\"empty_message\"} 1"));
    }
}
