//! MQTT Connection Manager
//!
//! Owns the single broker session. Split into two halves:
//!
//! - [`MqttBroker`]: cloneable handle implementing `BrokerPort` (publish,
//!   connection state, statistics)
//! - [`MqttEventLoop`]: drives the `rumqttc` event loop, re-subscribes on
//!   every connect, decodes inbound messages and reconnects on failure
//!
//! The event loop never subscribes with an awaiting call; requests are
//! queued with `try_subscribe_many` so a full request queue cannot stall the
//! loop that is supposed to drain it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubAck,
    SubscribeFilter, SubscribeReasonCode,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BrokerEvent, BrokerPort, BrokerStats, PublishError};
use crate::domain::topic::TopicNamespace;
use crate::infrastructure::config::BrokerSettings;
use crate::infrastructure::metrics;
use crate::infrastructure::mqtt::codec::CardCodec;
use crate::infrastructure::mqtt::reconnect::{ReconnectConfig, ReconnectPolicy};

const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

// =============================================================================
// Connection State Tracking
// =============================================================================

/// Shared connection state between the handle and the event loop.
#[derive(Debug, Default)]
pub struct ConnectionState {
    connected: AtomicBool,
    subscribed: AtomicBool,
    reconnect_attempts: AtomicU32,
    messages_received: AtomicU64,
    last_connected_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
}

impl ConnectionState {
    /// Record a successful connect.
    pub fn mark_connected(&self) {
        self.connected.store(true, Ordering::Release);
        self.subscribed.store(false, Ordering::Release);
        self.reconnect_attempts.store(0, Ordering::Relaxed);
        *self.last_connected_at.write() = Some(Utc::now());
        metrics::set_broker_connected(true);
    }

    /// Record a lost connection. Returns `true` if it was connected.
    pub fn mark_disconnected(&self) -> bool {
        self.subscribed.store(false, Ordering::Release);
        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        metrics::set_broker_connected(false);
        was_connected
    }

    /// Set whether inbound subscriptions are in place.
    pub fn set_subscribed(&self, subscribed: bool) {
        self.subscribed.store(subscribed, Ordering::Release);
    }

    /// Increment reconnect attempts, returning the new count.
    pub fn increment_reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Increment messages received counter.
    pub fn increment_messages(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether the session is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Snapshot for health reporting.
    #[must_use]
    pub fn snapshot(&self) -> BrokerStats {
        BrokerStats {
            connected: self.connected.load(Ordering::Acquire),
            subscribed: self.subscribed.load(Ordering::Acquire),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            last_connected_at: *self.last_connected_at.read(),
        }
    }
}

// =============================================================================
// Broker Handle
// =============================================================================

/// Cloneable handle to the broker session.
#[derive(Clone)]
pub struct MqttBroker {
    client: AsyncClient,
    state: Arc<ConnectionState>,
}

impl MqttBroker {
    /// Create the handle and its event loop driver.
    ///
    /// No network activity happens until [`MqttEventLoop::run`] is polled.
    #[must_use]
    pub fn connect(
        settings: &BrokerSettings,
        namespace: TopicNamespace,
        events: mpsc::Sender<BrokerEvent>,
    ) -> (Self, MqttEventLoop) {
        let client_id = settings.client_id(namespace.team_id());

        let mut options = MqttOptions::new(&client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, settings.request_capacity);
        let state = Arc::new(ConnectionState::default());

        tracing::debug!(
            client_id = %client_id,
            host = %settings.host,
            port = settings.port,
            "MQTT client created"
        );

        let handle = Self {
            client: client.clone(),
            state: Arc::clone(&state),
        };
        let driver = MqttEventLoop {
            client,
            eventloop,
            state,
            codec: CardCodec::new(namespace.clone()),
            namespace,
            events,
            policy: ReconnectPolicy::new(ReconnectConfig::from_broker_settings(settings)),
        };

        (handle, driver)
    }

    /// Shared connection state.
    #[must_use]
    pub fn state(&self) -> Arc<ConnectionState> {
        Arc::clone(&self.state)
    }
}

#[async_trait]
impl BrokerPort for MqttBroker {
    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    fn stats(&self) -> BrokerStats {
        self.state.snapshot()
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if !self.state.is_connected() {
            return Err(PublishError::NotConnected);
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| PublishError::Rejected(e.to_string()))
    }
}

// =============================================================================
// Event Loop Driver
// =============================================================================

/// Drives the broker session until cancelled.
pub struct MqttEventLoop {
    client: AsyncClient,
    eventloop: EventLoop,
    state: Arc<ConnectionState>,
    codec: CardCodec,
    namespace: TopicNamespace,
    events: mpsc::Sender<BrokerEvent>,
    policy: ReconnectPolicy,
}

impl MqttEventLoop {
    /// Run the connection loop.
    ///
    /// Reconnects indefinitely on failure. On cancellation a DISCONNECT is
    /// sent and flushed on a best-effort basis.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(team_id = %self.namespace.team_id(), "Starting MQTT connection manager");

        loop {
            let polled = tokio::select! {
                () = cancel.cancelled() => break,
                polled = self.eventloop.poll() => polled,
            };

            match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => self.on_connected().await,
                Ok(Event::Incoming(Packet::SubAck(ack))) => self.on_suback(&ack),
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let event = self.decode(&publish.topic, &publish.payload);
                    self.emit(event).await;
                }
                Ok(_) => {}
                Err(e) => {
                    let delay = self.on_connection_error(&e).await;
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.shutdown().await;
    }

    async fn on_connected(&mut self) {
        self.state.mark_connected();
        self.policy.reset();
        tracing::info!("Connected to MQTT broker");

        let filters = self
            .namespace
            .inbound_paths()
            .into_iter()
            .map(|path| SubscribeFilter::new(path.to_string(), QoS::AtLeastOnce));

        match self.client.try_subscribe_many(filters) {
            Ok(()) => tracing::debug!(
                topics = ?self.namespace.inbound_paths(),
                "Subscription requested"
            ),
            Err(e) => {
                self.state.set_subscribed(false);
                tracing::error!(error = %e, "Failed to request subscriptions, degraded until reconnect");
            }
        }

        self.emit(BrokerEvent::Connected).await;
    }

    fn on_suback(&self, ack: &SubAck) {
        let rejected = ack
            .return_codes
            .iter()
            .filter(|code| matches!(code, SubscribeReasonCode::Failure))
            .count();

        if rejected == 0 {
            self.state.set_subscribed(true);
            tracing::info!(
                topics = ?self.namespace.inbound_paths(),
                "Subscribed to card topics"
            );
        } else {
            self.state.set_subscribed(false);
            tracing::error!(rejected, "Broker rejected card topic subscription");
        }
    }

    async fn on_connection_error(&mut self, error: &ConnectionError) -> Duration {
        if self.state.mark_disconnected() {
            tracing::warn!(error = %error, "MQTT connection lost");
            self.emit(BrokerEvent::Disconnected).await;
        } else {
            tracing::warn!(error = %error, "MQTT connection attempt failed");
        }

        let delay = self.policy.next_delay();
        let attempt = self.state.increment_reconnect_attempts();
        metrics::record_reconnect();
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis(),
            "Reconnecting to MQTT broker"
        );
        self.emit(BrokerEvent::Reconnecting { attempt }).await;

        delay
    }

    /// Decode an inbound publish into an event.
    fn decode(&self, topic: &str, payload: &[u8]) -> BrokerEvent {
        match self.codec.decode(topic, payload) {
            Ok(card) => {
                self.state.increment_messages();
                if let Ok(kind) = self.codec.classify(topic) {
                    metrics::record_broker_message(kind);
                }
                tracing::debug!(topic, uid = card.uid(), "Card event received");
                BrokerEvent::Card(card)
            }
            Err(e) => {
                metrics::record_malformed();
                tracing::warn!(
                    topic,
                    payload_len = payload.len(),
                    error = %e,
                    "Dropping malformed broker message"
                );
                BrokerEvent::Malformed {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Takes `&mut self` so the future stays `Send`; `EventLoop` is not `Sync`.
    async fn emit(&mut self, event: BrokerEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("Broker event receiver dropped");
        }
    }

    async fn shutdown(mut self) {
        tracing::info!("MQTT connection manager cancelled");
        if !self.state.mark_disconnected() {
            return;
        }
        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(error = %e, "Disconnect request not queued");
            return;
        }

        let flushed = tokio::time::timeout(DISCONNECT_GRACE, async {
            while let Ok(event) = self.eventloop.poll().await {
                if matches!(event, Event::Outgoing(Outgoing::Disconnect)) {
                    break;
                }
            }
        })
        .await;

        if flushed.is_err() {
            tracing::debug!("Disconnect not flushed before grace period");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::infrastructure::http::HealthStatus;

    fn assert_send<T: Send>(_: &T) {}

    fn driver() -> (MqttBroker, MqttEventLoop, mpsc::Receiver<BrokerEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let settings = BrokerSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..BrokerSettings::default()
        };
        let (broker, driver) = MqttBroker::connect(&settings, TopicNamespace::new("team1"), tx);
        (broker, driver, rx)
    }

    #[test]
    fn state_tracks_connect_cycle() {
        let state = ConnectionState::default();
        assert!(!state.is_connected());
        assert_eq!(state.increment_reconnect_attempts(), 1);
        assert_eq!(state.increment_reconnect_attempts(), 2);

        state.mark_connected();
        state.set_subscribed(true);
        let stats = state.snapshot();
        assert!(stats.connected);
        assert!(stats.subscribed);
        assert_eq!(stats.reconnect_attempts, 0);
        assert!(stats.last_connected_at.is_some());

        assert!(state.mark_disconnected());
        assert!(!state.mark_disconnected());
        let stats = state.snapshot();
        assert!(!stats.connected);
        assert!(!stats.subscribed);
    }

    #[tokio::test]
    async fn publish_refused_while_disconnected() {
        let (broker, _driver, _rx) = driver();
        assert!(!broker.is_connected());
        assert_eq!(
            broker.publish("rfid/team1/card/topup", b"{}".to_vec()).await,
            Err(PublishError::NotConnected)
        );
    }

    #[tokio::test]
    async fn run_future_can_be_spawned() {
        let (_broker, driver, _rx) = driver();
        let run = driver.run(CancellationToken::new());
        assert_send(&run);
    }

    #[tokio::test]
    async fn rejected_subscription_leaves_session_degraded() {
        let (broker, driver, _rx) = driver();
        driver.state.mark_connected();

        driver.on_suback(&SubAck::new(
            1,
            vec![
                SubscribeReasonCode::Success(QoS::AtLeastOnce),
                SubscribeReasonCode::Failure,
            ],
        ));

        let stats = broker.stats();
        assert!(stats.connected);
        assert!(!stats.subscribed);
        assert_eq!(HealthStatus::from_stats(&stats), HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn accepted_subscription_marks_session_healthy() {
        let (broker, driver, _rx) = driver();
        driver.state.mark_connected();

        driver.on_suback(&SubAck::new(
            1,
            vec![
                SubscribeReasonCode::Success(QoS::AtLeastOnce),
                SubscribeReasonCode::Success(QoS::AtLeastOnce),
            ],
        ));

        assert!(broker.stats().subscribed);
        assert_eq!(
            HealthStatus::from_stats(&broker.stats()),
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn decode_counts_cards_and_flags_malformed() {
        let (broker, driver, _rx) = driver();

        let event = driver.decode("rfid/team1/card/status", br#"{"uid":"AB12","balance":500}"#);
        match event {
            BrokerEvent::Card(card) => assert_eq!(card.balance_value(), Decimal::from(500)),
            other => panic!("unexpected event: {other:?}"),
        }

        let event = driver.decode("rfid/team1/card/status", b"garbage");
        assert!(matches!(event, BrokerEvent::Malformed { .. }));

        assert_eq!(broker.stats().messages_received, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_broker_reports_reconnects_until_cancelled() {
        let (broker, driver, mut rx) = driver();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(driver.run(cancel.clone()));

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, BrokerEvent::Reconnecting { attempt: 1 }));
        assert!(!broker.is_connected());

        cancel.cancel();
        task.await.unwrap();
    }
}
