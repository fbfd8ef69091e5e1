//! Money amounts in minor units.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A non-negative money amount stored in cents.
///
/// Serialized as a two-decimal string (`"150.00"`); deserializes from either a
/// decimal string or a JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let value = raw.trim();
        let invalid = || Error::InvalidInput(format!("'{raw}' is not a valid amount"));

        let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
        if whole.is_empty() || !whole.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(invalid());
        }
        if fraction.len() > 2 || !fraction.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        whole
            .checked_mul(100)
            .and_then(|cents| cents.checked_add(fraction))
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

struct AmountVisitor;

impl Visitor<'_> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a decimal amount as string or number")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Amount, E> {
        value.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Amount, E> {
        i64::try_from(value)
            .ok()
            .and_then(|whole| whole.checked_mul(100))
            .map(Amount)
            .ok_or_else(|| E::custom("amount out of range"))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Amount, E> {
        if value < 0 {
            return Err(E::custom("amount cannot be negative"));
        }
        value
            .checked_mul(100)
            .map(Amount)
            .ok_or_else(|| E::custom("amount out of range"))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn visit_f64<E: de::Error>(self, value: f64) -> std::result::Result<Amount, E> {
        if !value.is_finite() || value < 0.0 {
            return Err(E::custom("amount must be a finite non-negative number"));
        }
        Ok(Amount((value * 100.0).round() as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("150".parse::<Amount>().unwrap(), Amount::from_cents(15_000));
        assert_eq!("150.5".parse::<Amount>().unwrap(), Amount::from_cents(15_050));
        assert_eq!(" 0.07 ".parse::<Amount>().unwrap(), Amount::from_cents(7));
    }

    #[test]
    fn rejects_malformed_amounts() {
        for raw in ["", "-5", "1.234", "abc", ".50", "1.x"] {
            assert!(raw.parse::<Amount>().is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn displays_two_decimals() {
        assert_eq!(Amount::from_cents(15_000).to_string(), "150.00");
        assert_eq!(Amount::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn deserializes_strings_and_numbers() {
        let from_str: Amount = serde_json::from_str("\"12.30\"").unwrap();
        let from_int: Amount = serde_json::from_str("12").unwrap();
        let from_float: Amount = serde_json::from_str("12.3").unwrap();
        assert_eq!(from_str, Amount::from_cents(1230));
        assert_eq!(from_int, Amount::from_cents(1200));
        assert_eq!(from_float, Amount::from_cents(1230));
        assert_eq!(serde_json::to_string(&from_str).unwrap(), "\"12.30\"");
    }
}
