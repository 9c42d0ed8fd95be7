use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

const CENTS_PER_POINT: i64 = 100;

//--------------------------------------       Points        ---------------------------------------------------------
/// A signed amount of loyalty points with two decimal places, stored as an integer number of hundredths.
///
/// Ledger arithmetic is exact. The only lossy step is [`Points::try_from_decimal`], which rounds a floating point
/// value (as returned by the accrual oracle) to the nearest hundredth.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Points(i64);

op!(binary Points, Add, add);
op!(binary Points, Sub, sub);
op!(inplace Points, AddAssign, add_assign);
op!(inplace Points, SubAssign, sub_assign);
op!(unary Points, Neg, neg);

impl Sum for Points {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in points: {0}")]
pub struct PointsConversionError(String);

impl Points {
    pub const ZERO: Points = Points(0);

    /// Creates a value from a raw count of hundredths of a point.
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn from_points(points: i64) -> Self {
        Self(points * CENTS_PER_POINT)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Converts a decimal amount into points, rounding to the nearest hundredth.
    pub fn try_from_decimal(value: f64) -> Result<Self, PointsConversionError> {
        if !value.is_finite() {
            return Err(PointsConversionError(format!("{value} is not a finite number")));
        }
        let cents = (value * CENTS_PER_POINT as f64).round();
        if cents > i64::MAX as f64 || cents < i64::MIN as f64 {
            return Err(PointsConversionError(format!("{value} is out of range")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(cents as i64))
    }
}

impl From<i64> for Points {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl Display for Points {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let cents = CENTS_PER_POINT.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / cents, abs % cents)
    }
}

impl FromStr for Points {
    type Err = PointsConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().parse::<f64>().map_err(|e| PointsConversionError(format!("{s}: {e}")))?;
        Self::try_from_decimal(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decimal_conversion_rounds_to_cents() {
        assert_eq!(Points::try_from_decimal(123.45).unwrap(), Points::from_cents(12_345));
        assert_eq!(Points::try_from_decimal(0.005).unwrap(), Points::from_cents(1));
        assert_eq!(Points::try_from_decimal(729.98).unwrap().to_string(), "729.98");
        assert!(Points::try_from_decimal(f64::NAN).is_err());
        assert!(Points::try_from_decimal(f64::INFINITY).is_err());
    }

    #[test]
    fn display() {
        assert_eq!(Points::from_cents(5).to_string(), "0.05");
        assert_eq!(Points::from_points(500).to_string(), "500.00");
        assert_eq!(Points::from_cents(-12_345).to_string(), "-123.45");
    }

    #[test]
    fn arithmetic() {
        let mut balance = Points::from_points(10);
        balance += Points::from_cents(250);
        balance -= Points::from_points(3);
        assert_eq!(balance, Points::from_cents(950));
        let total: Points = [Points::from_cents(1), Points::from_cents(2)].into_iter().sum();
        assert_eq!(total, Points::from_cents(3));
        assert!((-total).is_negative());
        assert_eq!("42.10".parse::<Points>().unwrap(), Points::from_cents(4_210));
    }
}
