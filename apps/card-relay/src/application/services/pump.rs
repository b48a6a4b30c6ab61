//! Broker Event Pump
//!
//! Drains broker notifications in arrival order and forwards card events to
//! the broadcaster. A single consumer keeps per-topic ordering intact.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::application::ports::BrokerEvent;
use crate::application::services::broadcaster::FanOutBroadcaster;

/// Consume broker events until the sender side is dropped.
///
/// Returns the number of card events broadcast.
pub async fn run_event_pump(
    mut events: mpsc::Receiver<BrokerEvent>,
    broadcaster: Arc<FanOutBroadcaster>,
) -> u64 {
    let mut forwarded = 0;

    while let Some(event) = events.recv().await {
        match event {
            BrokerEvent::Card(card) => {
                broadcaster.broadcast(card);
                forwarded += 1;
            }
            BrokerEvent::Connected => {
                tracing::info!(
                    subscribers = broadcaster.subscriber_count(),
                    "Broker connected"
                );
            }
            BrokerEvent::Disconnected => tracing::warn!("Broker disconnected"),
            BrokerEvent::Reconnecting { attempt } => {
                tracing::debug!(attempt, "Broker reconnect scheduled");
            }
            BrokerEvent::Malformed { topic, reason } => {
                tracing::debug!(%topic, %reason, "Dropped malformed broker message");
            }
        }
    }

    tracing::debug!(forwarded, "Broker event pump finished");
    forwarded
}
