//! Route handlers for the REST API and probes.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::AppState;
use crate::application::ports::BrokerStats;
use crate::application::services::GatewayError;
use crate::domain::card::number;
use crate::domain::topup::{TopUpCommand, TopUpRequest};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Tenant identifier.
    pub team_id: String,
    /// Relay version.
    pub version: String,
    /// Broker session established.
    pub broker_connected: bool,
    /// Inbound subscriptions confirmed.
    pub broker_subscribed: bool,
    /// Connected live subscribers.
    pub subscriber_count: usize,
    /// Card events received since startup.
    pub messages_received: u64,
    /// Reconnect attempts since the last connect.
    pub reconnect_attempts: u32,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub timestamp: DateTime<Utc>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Broker connected and subscribed.
    Healthy,
    /// Process is up but the broker session is not fully established.
    Degraded,
}

impl HealthStatus {
    /// Derive status from broker statistics.
    #[must_use]
    pub const fn from_stats(stats: &BrokerStats) -> Self {
        if stats.connected && stats.subscribed {
            Self::Healthy
        } else {
            Self::Degraded
        }
    }
}

/// Last card seen, as returned by `/status`.
///
/// The card identifier is serialized as `uid`, not `card_identifier`, so the
/// body uses the same field name as the device status frames and the
/// `/topup` request.
#[derive(Debug, Clone, Serialize)]
pub struct LastCard {
    /// Card identifier.
    pub uid: String,
    /// Last reported balance.
    #[serde(with = "number")]
    pub balance: Decimal,
    /// When the relay received it.
    pub last_update: DateTime<Utc>,
}

/// Error body for failed requests.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    status: &'static str,
    /// Error message.
    pub error: String,
    /// Additional detail, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    /// Create an error body.
    #[must_use]
    pub fn new(error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: "error",
            error: error.into(),
            details,
        }
    }
}

#[derive(Debug, Serialize)]
struct TopUpResponse {
    status: &'static str,
    message: &'static str,
    data: TopUpCommand,
}

#[derive(Debug, Serialize)]
struct NotFoundBody<'a> {
    error: &'static str,
    path: &'a str,
}

// =============================================================================
// Handlers
// =============================================================================

pub(super) async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.broker.stats();

    let response = HealthResponse {
        status: HealthStatus::from_stats(&stats),
        team_id: state.team_id.clone(),
        version: state.version.clone(),
        broker_connected: stats.connected,
        broker_subscribed: stats.subscribed,
        subscriber_count: state.broadcaster.subscriber_count(),
        messages_received: stats.messages_received,
        reconnect_attempts: stats.reconnect_attempts,
        uptime_secs: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
    };

    (StatusCode::OK, Json(response))
}

pub(super) async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(super) async fn readiness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.broker.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

pub(super) async fn status(State(state): State<Arc<AppState>>) -> Response {
    state.broadcaster.snapshot().map_or_else(
        || Json(serde_json::json!({})).into_response(),
        |event| {
            Json(LastCard {
                uid: event.uid().to_string(),
                balance: event.balance_value(),
                last_update: event.observed_at(),
            })
            .into_response()
        },
    )
}

pub(super) async fn top_up(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TopUpRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected top-up body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new(
                    "invalid request body",
                    Some(rejection.body_text()),
                )),
            )
                .into_response();
        }
    };

    match state.gateway.submit_top_up(&request).await {
        Ok(ack) => (
            StatusCode::OK,
            Json(TopUpResponse {
                status: "success",
                message: "Top-up command sent",
                data: ack.payload,
            }),
        )
            .into_response(),
        Err(e) => gateway_error_response(&e),
    }
}

pub(super) async fn metrics() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

pub(super) async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundBody {
            error: "Endpoint not found",
            path: uri.path(),
        }),
    )
        .into_response()
}

fn gateway_error_response(error: &GatewayError) -> Response {
    let (code, body) = match error {
        GatewayError::InvalidRequest(detail) => {
            (StatusCode::BAD_REQUEST, ErrorBody::new(detail.clone(), None))
        }
        GatewayError::Unavailable(detail) => (
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorBody::new(detail.clone(), None),
        ),
        GatewayError::PublishFailed(detail) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new("Failed to send top-up command", Some(detail.clone())),
        ),
    };
    (code, Json(body)).into_response()
}

// =============================================================================
// Tests
// =============================================================================
