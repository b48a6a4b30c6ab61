//! Card Payload Codec
//!
//! Decodes JSON payloads published by the card readers into domain events.
//!
//! - **status**: `{"uid": "...", "balance": 500, "timestamp": 1712345678}`
//! - **balance**: `{"uid": "...", "new_balance": 1500, "timestamp": 1712345678}`
//!
//! The balance topic also accepts `balance` in place of `new_balance`; when a
//! payload carries both, `new_balance` wins.
//! Amounts must be JSON numbers; numeric strings are rejected.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use crate::domain::card::{CardEvent, CardReading, number};
use crate::domain::topic::{Topic, TopicNamespace};

/// Codec errors. Every variant means the payload is dropped.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Topic is outside the relay's namespace.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// Topic is in the namespace but not an inbound one.
    #[error("not an inbound topic: {0}")]
    NotInbound(String),

    /// JSON decoding failed (syntax, missing field, or wrong type).
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Card identifier was empty.
    #[error("empty uid")]
    EmptyUid,

    /// Balance payload carried neither `new_balance` nor `balance`.
    #[error("missing new_balance")]
    MissingBalance,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    uid: String,
    #[serde(with = "number")]
    balance: Decimal,
    #[serde(default)]
    timestamp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BalancePayload {
    uid: String,
    #[serde(default, deserialize_with = "present_number")]
    new_balance: Option<Decimal>,
    #[serde(default, deserialize_with = "present_number")]
    balance: Option<Decimal>,
    #[serde(default)]
    timestamp: Option<f64>,
}

fn present_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Decimal>, D::Error> {
    number::deserialize(deserializer).map(Some)
}

/// Decoder bound to one topic namespace.
#[derive(Debug, Clone)]
pub struct CardCodec {
    namespace: TopicNamespace,
}

impl CardCodec {
    /// Create a codec for a namespace.
    #[must_use]
    pub const fn new(namespace: TopicNamespace) -> Self {
        Self { namespace }
    }

    /// Map a topic path to its inbound channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic is unknown or outbound.
    pub fn classify(&self, topic: &str) -> Result<Topic, CodecError> {
        match self.namespace.classify(topic) {
            Some(t @ (Topic::Status | Topic::Balance)) => Ok(t),
            Some(Topic::TopUp) => Err(CodecError::NotInbound(topic.to_string())),
            None => Err(CodecError::UnknownTopic(topic.to_string())),
        }
    }

    /// Decode a payload received on `topic`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the topic is not inbound or the payload is
    /// not a well-formed card message.
    pub fn decode(&self, topic: &str, payload: &[u8]) -> Result<CardEvent, CodecError> {
        match self.classify(topic)? {
            Topic::Status => {
                let msg: StatusPayload = serde_json::from_slice(payload)?;
                Ok(CardEvent::StatusUpdate(reading(
                    msg.uid,
                    msg.balance,
                    msg.timestamp,
                )?))
            }
            Topic::Balance => {
                let msg: BalancePayload = serde_json::from_slice(payload)?;
                let balance = msg
                    .new_balance
                    .or(msg.balance)
                    .ok_or(CodecError::MissingBalance)?;
                Ok(CardEvent::BalanceUpdate(reading(
                    msg.uid,
                    balance,
                    msg.timestamp,
                )?))
            }
            Topic::TopUp => Err(CodecError::NotInbound(topic.to_string())),
        }
    }
}

fn reading(
    uid: String,
    balance: Decimal,
    device_timestamp: Option<f64>,
) -> Result<CardReading, CodecError> {
    let uid = uid.trim();
    if uid.is_empty() {
        return Err(CodecError::EmptyUid);
    }
    Ok(CardReading {
        uid: uid.to_string(),
        balance,
        device_timestamp,
        observed_at: Utc::now(),
    })
}

// =============================================================================
// Tests
// =============================================================================
