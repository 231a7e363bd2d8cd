//! # Amount Module
//!
//! Provides the `Amount` type: a decimal value pinned to nine fractional
//! digits, the precision the government endpoint audits.
//!
//! ## Why Nine Decimals?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE DISPLAY-ROUNDING PROBLEM                                           │
//! │                                                                         │
//! │  Host system (2 decimals):                                              │
//! │    3 × 0.335 = 1.005  →  shown as 1.01 (or 1.00 with banker's)         │
//! │                                                                         │
//! │  Endpoint recomputes from quantity × price at 9 decimals:              │
//! │    3 × 0.335 = 1.005000000                                              │
//! │                                                                         │
//! │  If we transmit the host's 1.01 the totals disagree and the            │
//! │  document is rejected. So EVERY transmitted figure is recomputed       │
//! │  here from the line inputs, never copied from the host.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rounding
//! Every value entering the type is rounded half away from zero to nine
//! places, then rescaled so `Display` always prints exactly nine digits.
//!
//! ## Usage
//! ```rust
//! use fotara_core::amount::Amount;
//!
//! let qty: Amount = "3".parse().unwrap();
//! let price: Amount = "0.335".parse().unwrap();
//! assert_eq!((qty * price).to_string(), "1.005000000");
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use std::str::FromStr;

/// Fractional digits carried by every [`Amount`].
pub const SCALE: u32 = 9;

// =============================================================================
// Amount Type
// =============================================================================

/// A quantity or monetary value quantized to [`SCALE`] decimal places.
///
/// Equality is numeric: `1.5` and `1.500000000` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Zero at full scale.
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Quantizes a decimal to nine places (half away from zero).
    pub fn new(value: Decimal) -> Self {
        let mut v = value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
        v.rescale(SCALE);
        Amount(v)
    }

    /// Creates an amount from a whole number.
    pub fn from_int(value: i64) -> Self {
        Amount::new(Decimal::from(value))
    }

    /// Returns the underlying decimal.
    #[inline]
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Absolute value. Credit notes carry negative host quantities.
    pub fn abs(&self) -> Self {
        Amount::new(self.0.abs())
    }

    /// Applies a percentage rate: `self × rate / 100`, quantized.
    ///
    /// ## Example
    /// ```rust
    /// use fotara_core::amount::Amount;
    ///
    /// let ext: Amount = "1.005".parse().unwrap();
    /// let rate: Amount = "16".parse().unwrap();
    /// assert_eq!(ext.percent(rate).to_string(), "0.160800000");
    /// ```
    pub fn percent(&self, rate: Amount) -> Self {
        Amount::new(self.0 * (rate.0 / Decimal::ONE_HUNDRED))
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Amount::new)
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount::ZERO
    }
}

/// Always prints nine fractional digits, e.g. `1.005000000`.
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut v = self.0;
        v.rescale(SCALE);
        write!(f, "{}", v)
    }
}

// =============================================================================
// Arithmetic
// =============================================================================
// Sums of nine-place values are exact; products are re-quantized.

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Amount) -> Amount {
        Amount::new(self.0 + other.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, other: Amount) {
        *self = *self + other;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, other: Amount) -> Amount {
        Amount::new(self.0 - other.0)
    }
}

impl Mul for Amount {
    type Output = Amount;

    fn mul(self, other: Amount) -> Amount {
        Amount::new(self.0 * other.0)
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount::new(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, |acc, x| acc + x)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_display_always_nine_places() {
        assert_eq!(Amount::ZERO.to_string(), "0.000000000");
        assert_eq!(amt("12").to_string(), "12.000000000");
        assert_eq!(amt("-0.5").to_string(), "-0.500000000");
    }

    #[test]
    fn test_fraction_that_two_decimal_rounding_would_lose() {
        let total = amt("3") * amt("0.335");
        assert_eq!(total.to_string(), "1.005000000");
        assert_ne!(total, amt("1.01"));
        assert_ne!(total, amt("1.00"));
    }

    #[test]
    fn test_rounds_half_away_from_zero_at_ten_digits() {
        assert_eq!(amt("0.0000000005").to_string(), "0.000000001");
        assert_eq!(amt("-0.0000000005").to_string(), "-0.000000001");
        assert_eq!(amt("0.0000000004").to_string(), "0.000000000");
    }

    #[test]
    fn test_percent() {
        assert_eq!(amt("100").percent(amt("16")).to_string(), "16.000000000");
        assert_eq!(amt("0.1").percent(amt("7")).to_string(), "0.007000000");
        assert!(amt("50").percent(Amount::ZERO).is_zero());
    }

    #[test]
    fn test_abs_and_sign() {
        let neg = amt("-2.5");
        assert!(neg.is_negative());
        assert_eq!(neg.abs(), amt("2.5"));
        assert!(neg.abs().is_positive());
        assert!(!Amount::ZERO.is_negative());
        assert!(!Amount::ZERO.is_positive());
    }

    #[test]
    fn test_sum() {
        let total: Amount = vec![amt("0.1"), amt("0.2"), amt("0.3")].into_iter().sum();
        assert_eq!(total, amt("0.6"));
    }

    #[test]
    fn test_serde_accepts_strings_and_numbers() {
        let from_str: Amount = serde_json::from_str("\"0.335\"").unwrap();
        let from_num: Amount = serde_json::from_str("0.335").unwrap();
        assert_eq!(from_str, from_num);
    }
}
