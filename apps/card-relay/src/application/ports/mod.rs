//! Port Interfaces
//!
//! Contracts between the application services and the broker adapter,
//! following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `BrokerPort`: publish commands and report connection state
//! - `RelayMetrics`: counters for fan-out and command outcomes
//!
//! ## Driver Ports (Inbound)
//!
//! - `BrokerEvent`: lifecycle notifications and decoded card events emitted
//!   by the broker adapter

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::card::CardEvent;

/// Errors surfaced by a broker publish.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// Not connected to the broker.
    #[error("broker not connected")]
    NotConnected,
    /// Broker did not accept the publish in time.
    #[error("timeout")]
    Timeout,
    /// The client rejected the request.
    #[error("{0}")]
    Rejected(String),
}

/// Snapshot of broker connection statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    /// Currently connected.
    pub connected: bool,
    /// Inbound subscriptions confirmed since the last connect.
    pub subscribed: bool,
    /// Reconnect attempts since the last successful connect.
    pub reconnect_attempts: u32,
    /// Card events decoded since startup.
    pub messages_received: u64,
    /// When the last connection was established.
    pub last_connected_at: Option<DateTime<Utc>>,
}

/// Outbound broker operations used by the application.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Whether the broker connection is currently established.
    fn is_connected(&self) -> bool;

    /// Connection statistics for health reporting.
    fn stats(&self) -> BrokerStats;

    /// Publish a payload on a topic path.
    ///
    /// # Errors
    ///
    /// Returns `PublishError` if the broker client refuses the request.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// Instrumentation hooks called by the application services.
///
/// Every method defaults to doing nothing.
pub trait RelayMetrics: Send + Sync {
    /// Subscriber count changed.
    fn live_subscribers(&self, _count: usize) {}

    /// A broadcast finished.
    fn broadcast(&self, _delivered: usize, _removed: usize) {}

    /// A top-up request finished with `outcome`. `publish` is how long the
    /// broker publish took, when one was attempted.
    fn top_up(&self, _outcome: &'static str, _publish: Option<Duration>) {}
}

/// Metrics that record nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl RelayMetrics for NoopMetrics {}

/// Notifications emitted by the broker adapter.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// Connection established and subscriptions requested.
    Connected,
    /// Connection lost.
    Disconnected,
    /// Waiting before the next connection attempt.
    Reconnecting {
        /// Attempt number since the last successful connect.
        attempt: u32,
    },
    /// A card event was decoded.
    Card(CardEvent),
    /// An inbound payload could not be decoded and was dropped.
    Malformed {
        /// Topic it arrived on.
        topic: String,
        /// Decode failure.
        reason: String,
    },
}
