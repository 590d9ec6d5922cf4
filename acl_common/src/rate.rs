use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::Money;

//--------------------------------------   CommissionRate   ----------------------------------------------------------
/// A commission percentage, stored in basis points (hundredths of a percent). `10.00%` is 1000 bp.
///
/// Rates are snapshotted onto conversions and commissions when they are created, so a later change
/// to a partner's rate never alters historical amounts.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct CommissionRate(i64);

pub const MAX_RATE_BASIS_POINTS: i64 = 10_000;

#[derive(Debug, Clone, Error)]
#[error("Invalid commission rate: {0}")]
pub struct RateConversionError(String);

impl CommissionRate {
    /// A rate from basis points. Valid rates lie in `0..=10_000` (0% to 100%).
    pub fn from_basis_points(bp: i64) -> Result<Self, RateConversionError> {
        if (0..=MAX_RATE_BASIS_POINTS).contains(&bp) {
            Ok(Self(bp))
        } else {
            Err(RateConversionError(format!("{bp} basis points is outside 0..=10000")))
        }
    }

    /// A rate from a whole percentage, e.g. `CommissionRate::percent(10)` for 10.00%.
    pub fn percent(pct: i64) -> Result<Self, RateConversionError> {
        Self::from_basis_points(pct * 100)
    }

    pub fn basis_points(&self) -> i64 {
        self.0
    }

    /// The commission owed on `amount` at this rate, rounded half-up to the nearest cent.
    pub fn commission_on(&self, amount: Money) -> Money {
        let product = amount.value() * self.0;
        let cents = if product >= 0 { (product + 5_000) / 10_000 } else { (product - 5_000) / 10_000 };
        Money::from_cents(cents)
    }
}

impl Display for CommissionRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for CommissionRate {
    type Err = RateConversionError;

    /// Parses a percentage with at most two fractional digits, e.g. `10`, `7.5` or `12.25`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches('%');
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || frac.len() > 2 {
            return Err(RateConversionError(s.to_string()));
        }
        let whole: i64 = whole.parse().map_err(|_| RateConversionError(s.to_string()))?;
        let frac: i64 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<2}").parse().map_err(|_| RateConversionError(s.to_string()))?
        };
        Self::from_basis_points(whole * 100 + frac)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::CommissionRate;
    use crate::Money;

    #[test]
    fn ten_percent_of_200() {
        let rate = CommissionRate::percent(10).unwrap();
        assert_eq!(rate.commission_on(Money::from_whole(200)), Money::from_whole(20));
    }

    #[test]
    fn rounds_half_up() {
        // 2.5% of $0.99 = 2.475c -> 2c; 2.5% of $1.01 = 2.525c -> 3c
        let rate = CommissionRate::from_basis_points(250).unwrap();
        assert_eq!(rate.commission_on(Money::from_cents(99)), Money::from_cents(2));
        assert_eq!(rate.commission_on(Money::from_cents(101)), Money::from_cents(3));
    }

    #[test]
    fn parses_and_displays() {
        assert_eq!(CommissionRate::from_str("10").unwrap().basis_points(), 1000);
        assert_eq!(CommissionRate::from_str("7.5%").unwrap().basis_points(), 750);
        assert_eq!(CommissionRate::from_str("12.25").unwrap().to_string(), "12.25%");
        assert!(CommissionRate::from_str("101").is_err());
        assert!(CommissionRate::from_basis_points(-1).is_err());
    }
}
