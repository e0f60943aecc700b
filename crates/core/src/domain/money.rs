use std::fmt;
use std::ops::{Add, Sub};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Monetary amount held as an integer count of minor units (cents).
///
/// Serialized as a two-decimal `Decimal` so payloads read `"280.00"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor_units: i64) -> Self {
        Self(minor_units)
    }

    pub const fn from_major(major_units: i64) -> Self {
        Self(major_units * 100)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, DomainError> {
        let cents = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            * Decimal::ONE_HUNDRED;
        cents.to_i64().map(Self).ok_or_else(|| {
            DomainError::InvariantViolation(format!("amount `{value}` is out of range"))
        })
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// `basis_points` of this amount, truncated toward zero.
    pub fn scaled_bps(self, basis_points: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(basis_points)) / 10_000)
    }

    pub fn clamp_between(self, low: Money, high: Money) -> Money {
        if low > high {
            return self;
        }
        Money(self.0.clamp(low.0, high.0))
    }

    pub fn midpoint(self, other: Money) -> Money {
        Money(self.0 + (other.0 - self.0) / 2)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.to_decimal()
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}
