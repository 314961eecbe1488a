//! Core value types shared by the OMS, the mapper and the executor

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use thiserror::Error;

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Trading pair symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every order, position key and request payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Type - Exact Decimal Values for Prices and Quantities
// ============================================================================

/// Error returned when text cannot be read as an exact decimal
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not an exact decimal: {0:?}")]
pub struct ParseMoneyError(pub String);

/// Exact decimal type for every price, quantity and PnL value in the system.
///
/// Wraps `rust_decimal::Decimal`. Values are parsed from the exchange's
/// textual representation and rendered back to text unchanged, so a position
/// of `12.345` is closed with a request for exactly `12.345`.
///
/// `Money` is also the tag that the wire serializer looks for: a value of
/// this type always leaves the process as a canonical numeric string (see
/// [`crate::exchange::payload::serialize_payload`]).
///
/// # Example
/// ```
/// use crypto_oms::Money;
/// let qty: Money = "12.345".parse().unwrap();
/// assert_eq!(qty.to_string(), "12.345");
/// ```
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    /// Zero value
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// One value
    pub const ONE: Money = Money(Decimal::ONE);

    pub fn new(value: Decimal) -> Self {
        Money(value)
    }

    /// Create from i64 (for whole number values)
    pub fn from_i64(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    /// Get absolute value
    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    /// Check if value is zero
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Check if value is positive
    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Check if value is negative
    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Get minimum of two values
    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    /// Get the underlying Decimal
    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl FromStr for Money {
    type Err = ParseMoneyError;

    /// Parses plain (`"12.345"`) and scientific (`"1.5e-3"`) notation.
    /// Text that would need rounding to fit a `Decimal` is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseMoneyError(s.to_string()));
        }
        if trimmed.contains(|c: char| c == 'e' || c == 'E') {
            return Decimal::from_scientific(trimmed)
                .map(Money)
                .map_err(|_| ParseMoneyError(s.to_string()));
        }
        Decimal::from_str_exact(trimmed)
            .map(Money)
            .map_err(|_| ParseMoneyError(s.to_string()))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Money::from_i64(value)
    }
}

// Equality is numeric: "1.50" == "1.5"
impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for Money {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.normalize().hash(state);
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

#[cfg(test)]
mod money_tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_keeps_scale() {
        let qty: Money = "12.345".parse().unwrap();
        assert_eq!(qty.to_string(), "12.345");
        assert_eq!(qty.inner(), dec!(12.345));

        let trailing: Money = "0.100".parse().unwrap();
        assert_eq!(trailing.to_string(), "0.100");
    }

    #[test]
    fn test_parse_scientific() {
        let small: Money = "1.5e-3".parse().unwrap();
        assert_eq!(small, Money::new(dec!(0.0015)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("1.2.3".parse::<Money>().is_err());
    }

    #[test]
    fn test_numeric_equality_ignores_scale() {
        let a: Money = "1.50".parse().unwrap();
        let b: Money = "1.5".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_float_drift() {
        let a: Money = "0.1".parse().unwrap();
        let b: Money = "0.2".parse().unwrap();
        let c: Money = "0.3".parse().unwrap();
        assert_eq!(a + b, c);
    }

    #[test]
    fn test_sign_helpers() {
        assert!(Money::ONE.is_positive());
        assert!(!Money::ZERO.is_positive());
        assert!(!Money::ZERO.is_negative());
        assert!((-Money::ONE).is_negative());
        assert_eq!((-Money::ONE).abs(), Money::ONE);
    }

    #[test]
    fn test_money_serde_as_string() {
        let money: Money = "123.456".parse().unwrap();
        let json = serde_json::to_string(&money).unwrap();
        assert_eq!(json, "\"123.456\"");
        let parsed: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(money, parsed);
    }
}
