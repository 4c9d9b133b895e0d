use crate::error::TopupError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Reference currency every nominal price and processing cost is expressed in.
pub const REFERENCE_CURRENCY: &str = "RUB";

/// Minor units (decimal places) of the reference currency.
pub const REFERENCE_MINOR_UNITS: u32 = 2;

/// A positive quantity of LKM, the wallet's internal unit.
///
/// LKM is always integral; fractional credits do not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Lkm(u64);

impl Lkm {
    pub fn new(value: i64) -> Result<Self, TopupError> {
        if value > 0 {
            Ok(Self(value as u64))
        } else {
            Err(TopupError::InvalidAmount)
        }
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn as_decimal(&self) -> Decimal {
        Decimal::from(self.0)
    }
}

impl TryFrom<i64> for Lkm {
    type Error = TopupError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Lkm> for i64 {
    fn from(amount: Lkm) -> Self {
        amount.0 as i64
    }
}

impl fmt::Display for Lkm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} LKM", self.0)
    }
}

/// A monetary amount carried at fixed precision.
///
/// Values are rounded exactly once, to the minor units of their currency, when a
/// price is frozen into a quote. Every later stage copies the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Rounds half away from zero to `minor_units` decimal places.
    pub fn rounded(self, minor_units: u32) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(minor_units, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Percentage of this amount (`percent` is 0-100), unrounded.
    pub fn percent(self, percent: Decimal) -> Self {
        Self(self.0 * percent / Decimal::ONE_HUNDRED)
    }

    /// Converts a reference-currency amount into a currency quoted at `rub_per_unit`.
    pub fn from_reference(self, rub_per_unit: Decimal, minor_units: u32) -> Self {
        Self(self.0 / rub_per_unit).rounded(minor_units)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_lkm_validation() {
        assert!(Lkm::new(1).is_ok());
        assert!(matches!(Lkm::new(0), Err(TopupError::InvalidAmount)));
        assert!(matches!(Lkm::new(-5), Err(TopupError::InvalidAmount)));
    }

    #[test]
    fn test_lkm_serde_rejects_non_positive() {
        let ok: Lkm = serde_json::from_str("500").unwrap();
        assert_eq!(ok.value(), 500);
        assert!(serde_json::from_str::<Lkm>("0").is_err());
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        assert_eq!(Money::new(dec!(10.245)).rounded(2), Money::new(dec!(10.25)));
        assert_eq!(Money::new(dec!(10.244)).rounded(2), Money::new(dec!(10.24)));
        assert_eq!(Money::new(dec!(99.5)).rounded(0), Money::new(dec!(100)));
    }

    #[test]
    fn test_from_reference() {
        let total = Money::new(dec!(1025));
        assert_eq!(total.from_reference(dec!(100), 2), Money::new(dec!(10.25)));
        assert_eq!(total.from_reference(dec!(3), 2), Money::new(dec!(341.67)));
    }

    #[test]
    fn test_percent() {
        let nominal = Money::new(dec!(500));
        assert_eq!(nominal.percent(dec!(3)), Money::new(dec!(15)));
        assert_eq!(nominal + nominal.percent(dec!(3)), Money::new(dec!(515)));
    }
}
