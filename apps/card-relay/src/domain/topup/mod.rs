//! Top-Up Requests
//!
//! Validation of inbound top-up requests and construction of the command
//! payload published to the card reader.
//!
//! Requests arrive as loosely typed JSON. Both fields are captured as raw
//! values so that a missing field, a wrong type and an out-of-range amount
//! can each be reported precisely, in a fixed order:
//!
//! 1. card identifier present, a string, and non-empty
//! 2. amount present, a number, and strictly positive

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::card::{CardUid, number};

/// Raw top-up request as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TopUpRequest {
    /// Card identifier.
    pub uid: Option<serde_json::Value>,
    /// Amount to add.
    pub amount: Option<serde_json::Value>,
}

impl TopUpRequest {
    /// Build a request from typed values.
    #[must_use]
    pub fn new(uid: impl Into<String>, amount: impl Into<serde_json::Number>) -> Self {
        Self {
            uid: Some(serde_json::Value::String(uid.into())),
            amount: Some(serde_json::Value::Number(amount.into())),
        }
    }

    /// Validate the request, first failing check wins.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingUid` if the identifier is absent,
    /// not a string, or blank, and `ValidationError::InvalidAmount` if the
    /// amount is absent, not a number, or not greater than zero.
    pub fn validate(&self) -> Result<ValidTopUp, ValidationError> {
        let uid = match &self.uid {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.trim(),
            _ => return Err(ValidationError::MissingUid),
        };

        let amount = match &self.amount {
            Some(serde_json::Value::Number(n)) => {
                number::from_json(n).ok_or(ValidationError::InvalidAmount)?
            }
            _ => return Err(ValidationError::InvalidAmount),
        };

        if amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount);
        }

        Ok(ValidTopUp {
            uid: canonical_uid(uid),
            amount,
        })
    }
}

/// Canonical form of a card identifier (uppercase hex as the reader emits).
#[must_use]
pub fn canonical_uid(uid: &str) -> CardUid {
    uid.trim().to_uppercase()
}

/// A request that passed validation, with its identifier normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTopUp {
    /// Canonical card identifier.
    pub uid: CardUid,
    /// Positive amount.
    pub amount: Decimal,
}

impl ValidTopUp {
    /// Build the command payload, stamped with the given time.
    #[must_use]
    pub fn into_command(self, timestamp: DateTime<Utc>) -> TopUpCommand {
        TopUpCommand {
            uid: self.uid,
            amount: self.amount,
            timestamp,
        }
    }
}

/// Command payload published on the top-up topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopUpCommand {
    /// Canonical card identifier.
    pub uid: CardUid,
    /// Amount to add.
    #[serde(with = "number")]
    pub amount: Decimal,
    /// When the command was generated.
    pub timestamp: DateTime<Utc>,
}

impl TopUpCommand {
    /// Encode the command as JSON bytes for the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Validation failures for top-up requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Card identifier absent or blank.
    #[error("missing uid")]
    MissingUid,
    /// Amount absent, non-numeric, or not positive.
    #[error("invalid amount")]
    InvalidAmount,
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    fn request(value: serde_json::Value) -> TopUpRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test_case(json!({"amount": 1000}), ValidationError::MissingUid ; "uid absent")]
    #[test_case(json!({"uid": "", "amount": 1000}), ValidationError::MissingUid ; "uid empty")]
    #[test_case(json!({"uid": "   ", "amount": 1000}), ValidationError::MissingUid ; "uid blank")]
    #[test_case(json!({"uid": 1234, "amount": 1000}), ValidationError::MissingUid ; "uid not a string")]
    #[test_case(json!({"uid": null, "amount": 1000}), ValidationError::MissingUid ; "uid null")]
    #[test_case(json!({"uid": "ab12"}), ValidationError::InvalidAmount ; "amount absent")]
    #[test_case(json!({"uid": "ab12", "amount": 0}), ValidationError::InvalidAmount ; "amount zero")]
    #[test_case(json!({"uid": "ab12", "amount": -5}), ValidationError::InvalidAmount ; "amount negative")]
    #[test_case(json!({"uid": "ab12", "amount": "1000"}), ValidationError::InvalidAmount ; "amount string")]
    #[test_case(json!({"uid": "ab12", "amount": true}), ValidationError::InvalidAmount ; "amount bool")]
    #[test_case(json!({}), ValidationError::MissingUid ; "uid checked before amount")]
    fn rejects_invalid_requests(body: serde_json::Value, expected: ValidationError) {
        assert_eq!(request(body).validate(), Err(expected));
    }

    #[test]
    fn normalizes_uid_to_uppercase() {
        let valid = request(json!({"uid": " ab12 ", "amount": 1000}))
            .validate()
            .unwrap();
        assert_eq!(valid.uid, "AB12");
        assert_eq!(valid.amount, Decimal::from(1000));
    }

    #[test]
    fn accepts_fractional_amounts() {
        let valid = request(json!({"uid": "ab12", "amount": 12.5}))
            .validate()
            .unwrap();
        assert_eq!(valid.amount, Decimal::new(125, 1));
    }

    #[test]
    fn command_payload_shape() {
        let timestamp = Utc::now();
        let command = TopUpRequest::new("ab12", 1000)
            .validate()
            .unwrap()
            .into_command(timestamp);

        let value: serde_json::Value =
            serde_json::from_slice(&command.to_payload().unwrap()).unwrap();
        assert_eq!(value["uid"], "AB12");
        assert_eq!(value["amount"], 1000);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn error_messages() {
        assert_eq!(ValidationError::MissingUid.to_string(), "missing uid");
        assert_eq!(ValidationError::InvalidAmount.to_string(), "invalid amount");
    }

    proptest! {
        #[test]
        fn positive_amounts_validate(uid in "[a-fA-F0-9]{4,14}", amount in 1u32..1_000_000) {
            let valid = TopUpRequest::new(uid.clone(), amount).validate().unwrap();
            prop_assert_eq!(valid.uid, uid.to_uppercase());
            prop_assert_eq!(valid.amount, Decimal::from(amount));
        }

        #[test]
        fn non_positive_amounts_rejected(uid in "[a-fA-F0-9]{4,14}", amount in -1_000_000i64..=0) {
            prop_assert_eq!(
                TopUpRequest::new(uid, amount).validate(),
                Err(ValidationError::InvalidAmount)
            );
        }
    }
}
