//! Type-safe price representation using decimal arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A USD price.
///
/// The catalog API and the remote cart documents both carry prices as plain
/// JSON numbers, so this serializes through `f64` rather than the decimal
/// string form. Amounts are normalized to two decimal places on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl Price {
    /// Create a price from a decimal amount, rounding to cents.
    #[must_use]
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp(2))
    }

    /// Create a price from a float as returned by the catalog API.
    ///
    /// Returns `None` for NaN, infinite, or negative values.
    #[must_use]
    pub fn from_f64(value: f64) -> Option<Self> {
        if value < 0.0 {
            return None;
        }
        Decimal::from_f64_retain(value).map(Self::new)
    }

    /// The amount in dollars.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Multiply by a quantity, for line totals.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }

    /// Sum two prices.
    #[must_use]
    pub fn plus(&self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Default for Price {
    fn default() -> Self {
        Self(Decimal::ZERO)
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn from_f64_normalizes_to_cents() {
        let price = Price::from_f64(109.95).unwrap();
        assert_eq!(price.to_string(), "$109.95");

        let price = Price::from_f64(22.3).unwrap();
        assert_eq!(price.to_string(), "$22.30");
    }

    #[test]
    fn from_f64_rejects_invalid_values() {
        assert!(Price::from_f64(-1.0).is_none());
        assert!(Price::from_f64(f64::NAN).is_none());
        assert!(Price::from_f64(f64::INFINITY).is_none());
    }

    #[test]
    fn serializes_as_bare_number() {
        let price = Price::from_f64(55.99).unwrap();
        let json = serde_json::to_string(&price).unwrap();
        assert_eq!(json, "55.99");

        let back: Price = serde_json::from_str(&json).unwrap();
        assert_eq!(back, price);
    }

    #[test]
    fn line_total_math() {
        let price = Price::from_f64(9.99).unwrap();
        assert_eq!(price.times(3).to_string(), "$29.97");
        assert_eq!(price.plus(Price::from_f64(0.01).unwrap()).to_string(), "$10.00");
    }
}
