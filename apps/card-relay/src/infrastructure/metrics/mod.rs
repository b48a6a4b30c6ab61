//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Broker**: Inbound messages by topic, malformed drops, reconnects, connection state
//! - **Live updates**: Frames delivered, sink failures, subscriber count
//! - **Commands**: Top-up outcomes and publish latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::ports::RelayMetrics;
use crate::domain::topic::Topic;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Safe to call more than once; later calls return the first handle. If a
/// global recorder is already installed by someone else, a detached handle
/// is returned and metrics render empty.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                register_metrics();
                handle
            }
            Err(e) => {
                tracing::warn!(error = %e, "Prometheus recorder not installed");
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Broker
    describe_counter!(
        "card_relay_broker_messages_total",
        "Card events decoded from the broker"
    );
    describe_counter!(
        "card_relay_broker_malformed_total",
        "Broker payloads dropped because they could not be decoded"
    );
    describe_counter!(
        "card_relay_broker_reconnects_total",
        "Broker reconnection attempts"
    );
    describe_gauge!(
        "card_relay_broker_connected",
        "1 while the broker connection is established"
    );

    // Live updates
    describe_counter!(
        "card_relay_frames_delivered_total",
        "Frames handed to live subscribers"
    );
    describe_counter!(
        "card_relay_sink_failures_total",
        "Live subscribers removed after a failed or closed delivery"
    );
    describe_gauge!(
        "card_relay_live_subscribers",
        "Number of connected live subscribers"
    );

    // Commands
    describe_counter!(
        "card_relay_topup_requests_total",
        "Top-up requests by outcome"
    );
    describe_histogram!(
        "card_relay_publish_seconds",
        "Time to hand a command to the broker"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a card event decoded from a broker topic.
pub fn record_broker_message(topic: Topic) {
    counter!("card_relay_broker_messages_total", "topic" => topic.leaf()).increment(1);
}

/// Record a dropped malformed payload.
pub fn record_malformed() {
    counter!("card_relay_broker_malformed_total").increment(1);
}

/// Record a broker reconnection attempt.
pub fn record_reconnect() {
    counter!("card_relay_broker_reconnects_total").increment(1);
}

/// Update the broker connection gauge.
pub fn set_broker_connected(connected: bool) {
    gauge!("card_relay_broker_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record frames handed to live subscribers.
pub fn record_frames_delivered(count: u64) {
    counter!("card_relay_frames_delivered_total").increment(count);
}

/// Record subscribers removed after failed delivery.
pub fn record_sink_failures(count: u64) {
    counter!("card_relay_sink_failures_total").increment(count);
}

/// Update the live subscriber count.
#[allow(clippy::cast_precision_loss)]
pub fn set_live_subscribers(count: usize) {
    gauge!("card_relay_live_subscribers").set(count as f64);
}

/// Record a top-up request outcome.
pub fn record_topup(outcome: &'static str) {
    counter!("card_relay_topup_requests_total", "outcome" => outcome).increment(1);
}

/// Record how long a publish took.
pub fn record_publish_duration(duration: Duration) {
    histogram!("card_relay_publish_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Port Adapter
// =============================================================================

/// `RelayMetrics` backed by the Prometheus recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl RelayMetrics for PrometheusMetrics {
    fn live_subscribers(&self, count: usize) {
        set_live_subscribers(count);
    }

    fn broadcast(&self, delivered: usize, removed: usize) {
        record_frames_delivered(delivered as u64);
        if removed > 0 {
            record_sink_failures(removed as u64);
        }
    }

    fn top_up(&self, outcome: &'static str, publish: Option<Duration>) {
        record_topup(outcome);
        if let Some(elapsed) = publish {
            record_publish_duration(elapsed);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_renders() {
        let first = init_metrics();
        let second = init_metrics();

        record_broker_message(Topic::Status);
        PrometheusMetrics.top_up("success", Some(Duration::from_millis(3)));

        assert!(get_metrics_handle().is_some());
        for rendered in [first.render(), second.render()] {
            assert!(
                rendered.contains(r#"card_relay_broker_messages_total{topic="status"}"#),
                "{rendered}"
            );
            assert!(
                rendered.contains(r#"card_relay_topup_requests_total{outcome="success"}"#),
                "{rendered}"
            );
            assert!(rendered.contains("card_relay_publish_seconds"), "{rendered}");
        }
    }
}
