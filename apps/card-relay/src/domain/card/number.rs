//! JSON number encoding for decimal amounts.
//!
//! Devices and browsers exchange balances and amounts as plain JSON numbers.
//! Integral values are written as integers so `1000` stays `1000` on the
//! wire; fractional values fall back to a float.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};

/// Serialize a decimal as a JSON number.
///
/// # Errors
///
/// Returns an error if the value cannot be represented as a float.
pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract().is_zero()
        && let Some(integral) = value.to_i64()
    {
        return serializer.serialize_i64(integral);
    }

    value.to_f64().map_or_else(
        || Err(serde::ser::Error::custom("decimal out of range")),
        |float| serializer.serialize_f64(float),
    )
}

/// Deserialize a decimal from a JSON number. Strings are rejected.
///
/// # Errors
///
/// Returns an error if the input is not a finite number.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    deserializer.deserialize_any(NumberVisitor)
}

/// Convert a `serde_json::Number` into a decimal.
///
/// Returns `None` for values outside the decimal range.
#[must_use]
pub fn from_json(number: &serde_json::Number) -> Option<Decimal> {
    if let Some(i) = number.as_i64() {
        return Some(Decimal::from(i));
    }
    if let Some(u) = number.as_u64() {
        return Some(Decimal::from(u));
    }
    number.as_f64().and_then(Decimal::from_f64)
}

struct NumberVisitor;

impl Visitor<'_> for NumberVisitor {
    type Value = Decimal;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a JSON number")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Decimal, E> {
        Ok(Decimal::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Decimal, E> {
        Ok(Decimal::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Decimal, E> {
        Decimal::from_f64(v).ok_or_else(|| E::custom(format!("number {v} out of range")))
    }
}
