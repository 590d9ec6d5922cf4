use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------       Money        ----------------------------------------------------------
/// A two-decimal fixed-point currency amount, stored as an integer number of cents.
///
/// All arithmetic stays in integer cents, so amounts survive storage round-trips and repeated
/// addition without drift. Rounding only ever happens when a rate is applied, in
/// [`crate::CommissionRate::commission_on`].
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a currency amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.abs();
        write!(f, "{sign}${}.{:02}", cents / 100, cents % 100)
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    /// Parses decimal amounts with at most two fractional digits, e.g. `200`, `19.9` or `0.05`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (sign, digits) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(MoneyConversionError(s.to_string()));
        }
        if frac.len() > 2 {
            return Err(MoneyConversionError(format!("{s} has more than two decimal places")));
        }
        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| MoneyConversionError(s.to_string()))?
        };
        let frac: i64 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<2}");
            padded.parse().map_err(|_| MoneyConversionError(s.to_string()))?
        };
        Ok(Self(sign * (whole * 100 + frac)))
    }
}

impl Money {
    /// The amount in integer cents.
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn from_whole(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::Money;

    #[test]
    fn display_formats_cents() {
        assert_eq!(Money::from_cents(2000).to_string(), "$20.00");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-350).to_string(), "-$3.50");
    }

    #[test]
    fn parses_decimal_strings() {
        assert_eq!(Money::from_str("200.00").unwrap(), Money::from_cents(20_000));
        assert_eq!(Money::from_str("19.9").unwrap(), Money::from_cents(1990));
        assert_eq!(Money::from_str("0.05").unwrap(), Money::from_cents(5));
        assert_eq!(Money::from_str("-3.50").unwrap(), Money::from_cents(-350));
        assert_eq!(Money::from_str("7").unwrap(), Money::from_cents(700));
        assert!(Money::from_str("1.005").is_err());
        assert!(Money::from_str("").is_err());
    }

    #[test]
    fn arithmetic_is_exact() {
        let a = Money::from_str("0.10").unwrap();
        let total: Money = std::iter::repeat(a).take(10).sum();
        assert_eq!(total, Money::from_whole(1));
        assert_eq!(-a, Money::from_cents(-10));
    }
}
