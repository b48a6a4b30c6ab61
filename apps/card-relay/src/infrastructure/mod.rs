//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// MQTT broker adapter (connection manager, codec, reconnect policy).
pub mod mqtt;

/// HTTP API and WebSocket live-update server.
pub mod http;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
