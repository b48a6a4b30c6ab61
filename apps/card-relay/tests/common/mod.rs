//! Shared fixtures for the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use card_relay::infrastructure::config::LiveSettings;
use card_relay::{
    AppState, BrokerPort, BrokerStats, CommandGateway, FanOutBroadcaster, HttpServer,
    PublishError, TopicNamespace,
};

pub const TEAM_ID: &str = "team1";
pub const TOPUP_TOPIC: &str = "rfid/team1/card/topup";

/// In-memory broker that records publishes.
#[derive(Default)]
pub struct FakeBroker {
    connected: AtomicBool,
    subscribed: AtomicBool,
    reject_with: Mutex<Option<String>>,
    published: Mutex<Vec<(String, serde_json::Value)>>,
}

impl FakeBroker {
    pub fn connected() -> Arc<Self> {
        let broker = Self::default();
        broker.set_connected(true);
        Arc::new(broker)
    }

    pub fn disconnected() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        self.subscribed.store(connected, Ordering::SeqCst);
    }

    pub fn reject_publishes(&self, reason: &str) {
        *self.reject_with.lock() = Some(reason.to_string());
    }

    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl BrokerPort for FakeBroker {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn stats(&self) -> BrokerStats {
        BrokerStats {
            connected: self.is_connected(),
            subscribed: self.subscribed.load(Ordering::SeqCst),
            ..BrokerStats::default()
        }
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if let Some(reason) = self.reject_with.lock().clone() {
            return Err(PublishError::Rejected(reason));
        }
        let value = serde_json::from_slice(&payload).expect("payload is JSON");
        self.published.lock().push((topic.to_string(), value));
        Ok(())
    }
}

/// Wired application state around a fake broker.
pub struct TestApp {
    pub broker: Arc<FakeBroker>,
    pub broadcaster: Arc<FanOutBroadcaster>,
    pub state: Arc<AppState>,
    pub cancel: CancellationToken,
}

impl TestApp {
    pub fn new(broker: Arc<FakeBroker>) -> Self {
        Self::with_live(broker, LiveSettings::default())
    }

    pub fn with_live(broker: Arc<FakeBroker>, live: LiveSettings) -> Self {
        let port: Arc<dyn BrokerPort> = broker.clone();
        let broadcaster = Arc::new(FanOutBroadcaster::new());
        let gateway = Arc::new(CommandGateway::new(
            Arc::clone(&port),
            TopicNamespace::new(TEAM_ID),
            Duration::from_secs(5),
        ));
        let cancel = CancellationToken::new();
        let state = Arc::new(AppState::new(
            port,
            Arc::clone(&broadcaster),
            gateway,
            live,
            cancel.clone(),
        ));

        Self {
            broker,
            broadcaster,
            state,
            cancel,
        }
    }

    /// Serve on an ephemeral local port.
    pub async fn spawn(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HttpServer::new(addr.port(), Arc::clone(&self.state), self.cancel.clone());
        tokio::spawn(async move {
            server.serve(listener).await.unwrap();
        });
        addr
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
