#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::panic
    )
)]

//! RFID Card Relay - MQTT to WebSocket/HTTP Bridge
//!
//! A relay service that keeps a single session with the card readers' MQTT
//! broker, fans card status and balance events out to any number of live
//! WebSocket subscribers, and accepts top-up commands over HTTP which it
//! publishes back to the readers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `card`: Card status and balance events
//!   - `topic`: Fixed topic namespace for one team
//!   - `topup`: Top-up request validation and command payload
//!   - `registry`: Live subscriber registry
//!   - `cache`: Last-known card event
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Broker interface and broker events
//!   - `services`: Fan-out broadcaster, command gateway, event pump
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `mqtt`: Broker connection manager (`rumqttc`)
//!   - `http`: REST API, probes, metrics and WebSocket live channel (`axum`)
//!   - `config`: Environment configuration
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!                  ┌─────────────┐   ┌───────────┐   ┌─────────────┐
//! Card readers ───►│ MQTT broker │──►│ Event pump│──►│ Broadcaster │──► WS 1..N
//!      ▲           └─────────────┘   └───────────┘   └─────────────┘
//!      │                  ▲
//!      └──── topup ───────┴──── Command gateway ◄──── POST /topup
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Card events, topics, and subscriber state.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::card::{CardEvent, CardReading, EventKind};
pub use domain::registry::{ClientRegistry, Frame, Sink, SinkError, SinkId};
pub use domain::topic::{Topic, TopicNamespace};
pub use domain::topup::{TopUpCommand, TopUpRequest, ValidationError};

// Application
pub use application::ports::{BrokerEvent, BrokerPort, BrokerStats, PublishError};
pub use application::services::{
    CommandGateway, FanOutBroadcaster, GatewayError, TopUpAck, run_event_pump,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, RelayConfig};

// HTTP server
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, router};

// Broker adapter
pub use infrastructure::mqtt::{MqttBroker, MqttEventLoop};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
