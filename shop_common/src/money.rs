use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const STORE_CURRENCY_CODE: &str = "GBP";
pub const STORE_CURRENCY_SYMBOL: &str = "£";

//--------------------------------------        Money         ---------------------------------------------------------
/// An amount in the store currency, held as an integer number of minor units (pence).
///
/// On the wire, `Money` is a JSON number in major units (`199.99`), so that API clients never have to deal with
/// pence. Any value with more than two decimal places is rounded half away from zero when deserialized.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash)]
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
#[error("Value cannot be represented as a store currency amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{STORE_CURRENCY_SYMBOL}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_pence(pence: i64) -> Self {
        Self(pence)
    }

    pub fn from_pounds(pounds: i64) -> Self {
        Self(pounds * 100)
    }

    /// The amount in pence
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The amount in major units, with exactly two decimal places.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, MoneyConversionError> {
        value
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|pence| pence.to_i64())
            .map(Self)
            .ok_or_else(|| MoneyConversionError(value.to_string()))
    }

    /// Applies a rate expressed in basis points (1/100th of a percent), rounding half away from zero.
    pub fn apply_basis_points(&self, bps: u32) -> Self {
        let scaled = i128::from(self.0) * i128::from(bps);
        let rounded = if scaled >= 0 { (scaled + 5_000) / 10_000 } else { (scaled - 5_000) / 10_000 };
        #[allow(clippy::cast_possible_truncation)]
        Self(rounded as i64)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[allow(clippy::cast_precision_loss)]
        serializer.serialize_f64(self.0 as f64 / 100.0)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Self::from_decimal(value).map_err(serde::de::Error::custom)
    }
}
