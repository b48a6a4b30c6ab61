//! RFID Card Relay Binary
//!
//! Starts the MQTT to WebSocket/HTTP relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin card-relay
//! ```
//!
//! # Environment Variables
//!
//! - `TEAM_ID`: Topic namespace, no `+`, `#` or `/` (default: team^_^TopDog)
//! - `MQTT_BROKER`: Broker address (default: <mqtt://broker.benax.rw:1883>)
//! - `MQTT_CLIENT_ID_PREFIX`: Client identity prefix (default: backend)
//! - `MQTT_KEEP_ALIVE_SECS`: Keep-alive interval (default: 60)
//! - `MQTT_RECONNECT_DELAY_MS`: Delay between reconnects (default: 5000, minimum 1000)
//! - `MQTT_RECONNECT_MAX_DELAY_MS`: Ceiling when the delay grows (default: the reconnect delay)
//! - `MQTT_RECONNECT_MULTIPLIER`: Delay growth per attempt (default: 1.0, range 1.0 to 10.0)
//! - `MQTT_RECONNECT_JITTER`: Random spread per delay (default: 0.0, range 0.0 to 0.5)
//! - `MQTT_PUBLISH_TIMEOUT_SECS`: Bound on a top-up publish (default: 5)
//! - `MQTT_REQUEST_CAPACITY`: Broker request queue size (default: 64)
//! - `PORT` / `RELAY_HTTP_PORT`: HTTP and WebSocket port (default: 9218)
//! - `RELAY_SINK_CAPACITY`: Per-subscriber frame buffer (default: 256)
//! - `RELAY_PING_INTERVAL_SECS`: WebSocket ping cadence (default: 30)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: rfid-card-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use card_relay::application::ports::BrokerPort;
use card_relay::application::services::{CommandGateway, FanOutBroadcaster, run_event_pump};
use card_relay::infrastructure::http::{AppState, HttpServer};
use card_relay::infrastructure::metrics::PrometheusMetrics;
use card_relay::infrastructure::mqtt::MqttBroker;
use card_relay::infrastructure::telemetry;
use card_relay::{RelayConfig, TopicNamespace, init_metrics};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffer between the broker event loop and the event pump.
const BROKER_EVENT_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting RFID card relay");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = RelayConfig::from_env().context("invalid relay configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let namespace = TopicNamespace::new(config.team_id.clone());

    // Broker connection manager
    let (event_tx, event_rx) = mpsc::channel(BROKER_EVENT_CAPACITY);
    let (broker, event_loop) = MqttBroker::connect(&config.broker, namespace.clone(), event_tx);
    let broker: Arc<dyn BrokerPort> = Arc::new(broker);

    // Application services
    let broadcaster = Arc::new(FanOutBroadcaster::new().with_metrics(Arc::new(PrometheusMetrics)));
    let gateway = Arc::new(
        CommandGateway::new(
            Arc::clone(&broker),
            namespace,
            config.broker.publish_timeout,
        )
        .with_metrics(Arc::new(PrometheusMetrics)),
    );

    let app_state = Arc::new(AppState::new(
        Arc::clone(&broker),
        Arc::clone(&broadcaster),
        gateway,
        config.live.clone(),
        shutdown_token.clone(),
    ));
    let http_server = HttpServer::new(
        config.server.http_port,
        app_state,
        shutdown_token.clone(),
    );

    // Spawn broker event loop
    let broker_task = tokio::spawn(event_loop.run(shutdown_token.clone()));

    // Spawn event pump
    let pump_task = tokio::spawn(run_event_pump(event_rx, Arc::clone(&broadcaster)));

    // Spawn HTTP server
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Card relay ready");

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = broker_task.await;
        let _ = http_task.await;
        pump_task.await.unwrap_or_default()
    })
    .await;

    match drained {
        Ok(forwarded) => tracing::info!(forwarded, "Card relay stopped"),
        Err(_) => tracing::warn!("Shutdown timed out, exiting"),
    }
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        team_id = %config.team_id,
        broker_host = %config.broker.host,
        broker_port = config.broker.port,
        http_port = config.server.http_port,
        "Configuration loaded"
    );
    tracing::debug!(
        keep_alive_secs = config.broker.keep_alive.as_secs(),
        reconnect_delay_ms = config.broker.reconnect_delay.as_millis(),
        publish_timeout_secs = config.broker.publish_timeout.as_secs(),
        sink_capacity = config.live.sink_capacity,
        ping_interval_secs = config.live.ping_interval.as_secs(),
        "Relay tuning"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
