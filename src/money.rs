//! Monetary Amounts
//!
//! ACH records carry amounts as zero-padded cent fields; repositories and
//! return matching compare amounts as currency + decimal value. All
//! conversions between the two go through this module.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MoneyError {
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Invalid amount value: {0}")]
    InvalidValue(String),

    #[error("Amount must not be negative")]
    Negative,
}

/// A currency-tagged amount.
///
/// ACH is a US network, so `USD` is the only currency accepted today; the
/// tag is kept so stored amounts stay self-describing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    currency: String,
    value: Decimal,
}

impl Amount {
    /// Parse an amount from a currency symbol and decimal string, e.g.
    /// `Amount::new("USD", "0.22")`.
    pub fn new(currency: &str, value: &str) -> Result<Self, MoneyError> {
        if currency != "USD" {
            return Err(MoneyError::UnsupportedCurrency(currency.to_string()));
        }
        let value = Decimal::from_str(value)
            .map_err(|_| MoneyError::InvalidValue(value.to_string()))?;
        if value.is_sign_negative() {
            return Err(MoneyError::Negative);
        }
        Ok(Self {
            currency: currency.to_string(),
            value: value.round_dp(2),
        })
    }

    /// Build a USD amount from an ACH record's cent field.
    pub fn from_cents(cents: u64) -> Self {
        Self {
            currency: "USD".to_string(),
            value: Decimal::new(cents as i64, 2),
        }
    }

    /// Cents for a zero-padded ACH amount field.
    pub fn to_cents(&self) -> u64 {
        let scaled = (self.value * Decimal::new(100, 0)).round();
        scaled.to_u64().unwrap_or(0)
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn value(&self) -> Decimal {
        self.value
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let amt = Amount::new("USD", "0.22").unwrap();
        assert_eq!(amt.to_string(), "USD 0.22");
        assert_eq!(amt.to_cents(), 22);

        let amt = Amount::new("USD", "52.12").unwrap();
        assert_eq!(amt.to_cents(), 5212);
    }

    #[test]
    fn test_cents_roundtrip() {
        for cents in [0u64, 1, 22, 99, 100, 5212, 123_456_789] {
            assert_eq!(Amount::from_cents(cents).to_cents(), cents);
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            Amount::new("EUR", "1.00"),
            Err(MoneyError::UnsupportedCurrency(_))
        ));
        assert!(matches!(
            Amount::new("USD", "abc"),
            Err(MoneyError::InvalidValue(_))
        ));
        assert!(matches!(Amount::new("USD", "-1.00"), Err(MoneyError::Negative)));
    }

    #[test]
    fn test_equality_for_lookup() {
        let a = Amount::new("USD", "0.22").unwrap();
        let b = Amount::from_cents(22);
        assert_eq!(a, b);
    }
}
