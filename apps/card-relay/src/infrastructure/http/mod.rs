//! HTTP and Live-Update Server
//!
//! Single `axum` server carrying the REST API, the WebSocket live channel,
//! probes and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe (broker connected)
//! - `GET /status` - last card seen, or `{}`
//! - `POST /topup` - submit a top-up command
//! - `GET /` and `GET /ws` - live card updates over WebSocket
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::application::ports::BrokerPort;
use crate::application::services::{CommandGateway, FanOutBroadcaster};
use crate::infrastructure::config::LiveSettings;

pub mod handlers;
pub mod live;

pub use handlers::{ErrorBody, HealthResponse, HealthStatus, LastCard};
pub use live::ChannelSink;

// =============================================================================
// Application State
// =============================================================================

/// Shared state for all routes.
pub struct AppState {
    team_id: String,
    version: String,
    started_at: Instant,
    broker: Arc<dyn BrokerPort>,
    broadcaster: Arc<FanOutBroadcaster>,
    gateway: Arc<CommandGateway>,
    live: LiveSettings,
    cancel: CancellationToken,
}

impl AppState {
    /// Create the shared state.
    #[must_use]
    pub fn new(
        broker: Arc<dyn BrokerPort>,
        broadcaster: Arc<FanOutBroadcaster>,
        gateway: Arc<CommandGateway>,
        live: LiveSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            team_id: gateway.namespace().team_id().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
            broker,
            broadcaster,
            gateway,
            live,
            cancel,
        }
    }
}

/// Build the router with every route and middleware layer.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/healthz", get(handlers::liveness))
        .route("/readyz", get(handlers::readiness))
        .route("/status", get(handlers::status))
        .route("/topup", post(handlers::top_up))
        .route("/metrics", get(handlers::metrics))
        .route("/", get(live::ws_handler))
        .route("/ws", get(live::ws_handler))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// HTTP server for the API and live channel.
pub struct HttpServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind the listening socket and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError::ServerFailed` if the server stops with an error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HttpServerError> {
        let port = listener.local_addr().map_or(self.port, |a| a.port());
        tracing::info!(port, "HTTP server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
