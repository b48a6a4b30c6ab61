//! Card Event Types
//!
//! Domain types for what the card readers report: a card was presented
//! (status) or a card's balance changed after a top-up (balance).
//!
//! # Design
//!
//! Both event kinds carry the same reading (card identifier, balance,
//! optional device timestamp) plus the instant the relay observed it. The
//! kind is kept as a tag on the enum so that consumers can match on it
//! without re-inspecting the topic the event arrived on.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

pub mod number;

// =============================================================================
// Types
// =============================================================================

/// A card identifier as reported by the reader (hex UID).
pub type CardUid = String;

/// Kind of card event, used as the `type` tag on live frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A card was presented to the reader.
    StatusUpdate,
    /// A card's balance changed.
    BalanceUpdate,
}

impl EventKind {
    /// Get the wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StatusUpdate => "status_update",
            Self::BalanceUpdate => "balance_update",
        }
    }
}

/// A single card reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardReading {
    /// Card identifier.
    pub uid: CardUid,
    /// Balance on the card after this event.
    #[serde(with = "number")]
    pub balance: Decimal,
    /// Timestamp reported by the device, when present.
    #[serde(rename = "timestamp", skip_serializing_if = "Option::is_none")]
    pub device_timestamp: Option<f64>,
    /// When the relay received the event.
    #[serde(skip)]
    pub observed_at: DateTime<Utc>,
}

/// An event decoded from the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum CardEvent {
    /// Card presented to the reader.
    StatusUpdate(CardReading),
    /// Balance changed after a top-up.
    BalanceUpdate(CardReading),
}

impl CardEvent {
    /// Create a status event observed now.
    #[must_use]
    pub fn status(uid: impl Into<CardUid>, balance: Decimal) -> Self {
        Self::StatusUpdate(CardReading {
            uid: uid.into(),
            balance,
            device_timestamp: None,
            observed_at: Utc::now(),
        })
    }

    /// Create a balance event observed now.
    #[must_use]
    pub fn balance(uid: impl Into<CardUid>, balance: Decimal) -> Self {
        Self::BalanceUpdate(CardReading {
            uid: uid.into(),
            balance,
            device_timestamp: None,
            observed_at: Utc::now(),
        })
    }

    /// Get the event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::StatusUpdate(_) => EventKind::StatusUpdate,
            Self::BalanceUpdate(_) => EventKind::BalanceUpdate,
        }
    }

    /// Get the reading carried by this event.
    #[must_use]
    pub const fn reading(&self) -> &CardReading {
        match self {
            Self::StatusUpdate(reading) | Self::BalanceUpdate(reading) => reading,
        }
    }

    /// Get the card identifier.
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.reading().uid
    }

    /// Get the reported balance.
    #[must_use]
    pub fn balance_value(&self) -> Decimal {
        self.reading().balance
    }

    /// Get the instant the relay observed this event.
    #[must_use]
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.reading().observed_at
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names() {
        assert_eq!(EventKind::StatusUpdate.as_str(), "status_update");
        assert_eq!(EventKind::BalanceUpdate.as_str(), "balance_update");
        assert_eq!(
            serde_json::to_string(&EventKind::BalanceUpdate).unwrap(),
            "\"balance_update\""
        );
    }

    #[test]
    fn event_accessors() {
        let event = CardEvent::status("AB12", Decimal::from(500));
        assert_eq!(event.kind(), EventKind::StatusUpdate);
        assert_eq!(event.uid(), "AB12");
        assert_eq!(event.balance_value(), Decimal::from(500));

        let event = CardEvent::balance("AB12", Decimal::from(1500));
        assert_eq!(event.kind(), EventKind::BalanceUpdate);
        assert_eq!(event.balance_value(), Decimal::from(1500));
    }

    #[test]
    fn reading_serializes_without_observed_at() {
        let mut reading = CardEvent::status("AB12", Decimal::from(500))
            .reading()
            .clone();
        let value = serde_json::to_value(&reading).unwrap();
        assert_eq!(value, serde_json::json!({"uid": "AB12", "balance": 500}));

        reading.device_timestamp = Some(1_700_000_000.5);
        let value = serde_json::to_value(&reading).unwrap();
        assert_eq!(value["timestamp"].as_f64(), Some(1_700_000_000.5));
    }
}
