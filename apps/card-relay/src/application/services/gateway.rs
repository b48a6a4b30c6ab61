//! Command Gateway
//!
//! Validates top-up requests and publishes them on the command topic,
//! reporting the outcome to the caller synchronously.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::application::ports::{BrokerPort, NoopMetrics, PublishError, RelayMetrics};
use crate::domain::topic::{Topic, TopicNamespace};
use crate::domain::topup::{TopUpCommand, TopUpRequest};

/// Default bound on a single publish.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors returned by [`CommandGateway::submit_top_up`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Client input failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The broker is not connected.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// The publish was attempted and failed or timed out.
    #[error("publish failed: {0}")]
    PublishFailed(String),
}

impl GatewayError {
    /// Outcome label used for metrics.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid",
            Self::Unavailable(_) => "unavailable",
            Self::PublishFailed(_) => "failed",
        }
    }

    /// Human-readable detail without the category prefix.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::InvalidRequest(d) | Self::Unavailable(d) | Self::PublishFailed(d) => d,
        }
    }
}

/// Acknowledgement of a published top-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpAck {
    /// The exact payload that was published.
    pub payload: TopUpCommand,
}

/// Publishes validated top-up commands through a broker port.
pub struct CommandGateway {
    broker: Arc<dyn BrokerPort>,
    namespace: TopicNamespace,
    publish_timeout: Duration,
    metrics: Arc<dyn RelayMetrics>,
}

impl CommandGateway {
    /// Create a gateway.
    #[must_use]
    pub fn new(
        broker: Arc<dyn BrokerPort>,
        namespace: TopicNamespace,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            namespace,
            publish_timeout,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Report command outcomes to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn RelayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Validate and publish a top-up request.
    ///
    /// Checks run in order and the first failure wins: card identifier,
    /// amount, broker connection. Nothing is published unless all pass.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the request fails validation
    /// - `Unavailable` if the broker is not connected
    /// - `PublishFailed` if the broker rejects the publish or it times out
    pub async fn submit_top_up(&self, request: &TopUpRequest) -> Result<TopUpAck, GatewayError> {
        let mut publish_time = None;
        let result = self.submit(request, &mut publish_time).await;

        match &result {
            Ok(ack) => {
                self.metrics.top_up("success", publish_time);
                tracing::info!(
                    uid = %ack.payload.uid,
                    amount = %ack.payload.amount,
                    "Top-up command published"
                );
            }
            Err(e) => {
                self.metrics.top_up(e.outcome(), publish_time);
                tracing::warn!(error = %e, "Top-up command rejected");
            }
        }

        result
    }

    async fn submit(
        &self,
        request: &TopUpRequest,
        publish_time: &mut Option<Duration>,
    ) -> Result<TopUpAck, GatewayError> {
        let valid = request
            .validate()
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        if !self.broker.is_connected() {
            return Err(GatewayError::Unavailable(
                PublishError::NotConnected.to_string(),
            ));
        }

        let command = valid.into_command(Utc::now());
        let payload = command
            .to_payload()
            .map_err(|e| GatewayError::PublishFailed(e.to_string()))?;
        let topic = self.namespace.path(Topic::TopUp);

        let started = Instant::now();
        let published = tokio::time::timeout(
            self.publish_timeout,
            self.broker.publish(topic, payload),
        )
        .await;
        *publish_time = Some(started.elapsed());

        match published {
            Ok(Ok(())) => Ok(TopUpAck { payload: command }),
            Ok(Err(e)) => Err(GatewayError::PublishFailed(e.to_string())),
            Err(_) => Err(GatewayError::PublishFailed(
                PublishError::Timeout.to_string(),
            )),
        }
    }

    /// Topic namespace used for publishing.
    #[must_use]
    pub const fn namespace(&self) -> &TopicNamespace {
        &self.namespace
    }
}

// =============================================================================
// Tests
// =============================================================================
