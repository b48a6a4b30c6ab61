//! Fan-Out Broadcaster
//!
//! Serializes each card event once and hands the same frame to every live
//! sink. A sink that is closed or fails delivery is removed on the spot;
//! the remaining sinks still receive the frame.
//!
//! # Ordering
//!
//! `broadcast` and `attach` are serialized by a short gate so that a new
//! subscriber receives its snapshot frame strictly before any event that is
//! broadcast after it attached, and never misses an event broadcast after
//! its snapshot was taken. Delivery is non-blocking, so the gate is never
//! held across an await point.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::application::ports::{NoopMetrics, RelayMetrics};
use crate::domain::cache::StateCache;
use crate::domain::card::{CardEvent, CardReading, EventKind};
use crate::domain::registry::{ClientRegistry, Frame, Sink, SinkError, SinkId};

// =============================================================================
// Frames
// =============================================================================

/// Live-update frame for one card event.
#[derive(Debug, Serialize)]
pub struct LiveFrame<'a> {
    /// Event kind tag.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Card reading.
    pub data: &'a CardReading,
    /// When the relay received the event.
    pub received_at: DateTime<Utc>,
}

impl<'a> LiveFrame<'a> {
    /// Build the frame for an event.
    #[must_use]
    pub fn new(event: &'a CardEvent) -> Self {
        Self {
            kind: event.kind(),
            data: event.reading(),
            received_at: event.observed_at(),
        }
    }

    /// Serialize into a shareable frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}

/// Greeting sent to every subscriber as soon as it connects.
#[derive(Debug, Serialize)]
pub struct WelcomeFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'static str,
    team_id: &'a str,
    timestamp: DateTime<Utc>,
}

impl<'a> WelcomeFrame<'a> {
    /// Build a welcome frame for the given team.
    #[must_use]
    pub fn new(team_id: &'a str) -> Self {
        Self {
            kind: "connection",
            message: "Connected to RFID Top-Up System",
            team_id,
            timestamp: Utc::now(),
        }
    }

    /// Serialize into a shareable frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}

// =============================================================================
// Broadcast Report
// =============================================================================

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sinks that accepted the frame.
    pub delivered: usize,
    /// Sinks whose delivery failed and were removed.
    pub failed: usize,
    /// Sinks found closed and removed without a delivery attempt.
    pub closed: usize,
}

impl BroadcastReport {
    /// Total sinks removed by this broadcast.
    #[must_use]
    pub const fn removed(&self) -> usize {
        self.failed + self.closed
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Fans card events out to every registered sink and keeps the last event
/// for late joiners.
pub struct FanOutBroadcaster {
    registry: ClientRegistry,
    cache: StateCache,
    gate: Mutex<()>,
    metrics: Arc<dyn RelayMetrics>,
}

impl Default for FanOutBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl FanOutBroadcaster {
    /// Create a broadcaster with an empty registry and cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: ClientRegistry::new(),
            cache: StateCache::new(),
            gate: Mutex::new(()),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Report fan-out activity to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn RelayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Register a sink, delivering the cached event to it first.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the snapshot frame could not be delivered; the
    /// sink is not registered in that case.
    pub fn attach(&self, sink: Arc<dyn Sink>) -> Result<SinkId, SinkError> {
        let _gate = self.gate.lock();

        if let Some(event) = self.cache.current() {
            match LiveFrame::new(&event).encode() {
                Ok(frame) => sink.deliver(&frame)?,
                Err(e) => tracing::warn!(error = %e, "Failed to encode snapshot frame"),
            }
        }

        let id = self.registry.register(sink);
        self.metrics.live_subscribers(self.registry.len());
        tracing::debug!(sink_id = id, "Subscriber attached");
        Ok(id)
    }

    /// Remove a sink. Removing an absent sink is a no-op.
    pub fn detach(&self, id: SinkId) -> bool {
        let removed = self.registry.unregister(id);
        if removed {
            self.metrics.live_subscribers(self.registry.len());
            tracing::debug!(sink_id = id, "Subscriber detached");
        }
        removed
    }

    /// Cache an event and deliver it to every open sink.
    pub fn broadcast(&self, event: CardEvent) -> BroadcastReport {
        let _gate = self.gate.lock();

        let frame = match LiveFrame::new(&event).encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, uid = event.uid(), "Failed to encode card event");
                return BroadcastReport::default();
            }
        };
        self.cache.update(event);

        let mut report = BroadcastReport::default();
        self.registry.for_each(|id, sink| {
            // Liveness is re-checked per sink; it may have closed since the
            // iteration began.
            if !sink.is_open() {
                self.registry.unregister(id);
                report.closed += 1;
                return;
            }

            match sink.deliver(&frame) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(sink_id = id, error = %e, "Sink delivery failed, removing");
                    self.registry.unregister(id);
                    report.failed += 1;
                }
            }
        });

        self.metrics.broadcast(report.delivered, report.removed());
        if report.removed() > 0 {
            self.metrics.live_subscribers(self.registry.len());
        }
        tracing::debug!(
            delivered = report.delivered,
            removed = report.removed(),
            "Broadcast card event"
        );

        report
    }

    /// Last event seen, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<CardEvent> {
        self.cache.current()
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Read access to the subscriber registry.
    #[must_use]
    pub const fn registry(&self) -> &ClientRegistry {
        &self.registry
    }
}

/// Shared broadcaster reference.
pub type SharedBroadcaster = Arc<FanOutBroadcaster>;

// =============================================================================
// Tests
// =============================================================================
