//! Amount type: a signed decimal quantity tagged with a currency.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};
use thiserror::Error;

/// Largest number of decimal places a `Decimal` holds.
const MAX_SCALE: u32 = 28;

/// A sum or product outside the range of `Decimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("arithmetic overflow")]
pub struct ArithmeticOverflow;

/// A quantity paired with a currency.
///
/// Arithmetic is exact; nothing here rounds.
///
/// ```
/// use beanroot_core::Amount;
/// use rust_decimal_macros::dec;
///
/// let a = Amount::new(dec!(100.00), "USD");
/// let b = Amount::new(dec!(-40.25), "USD");
/// assert_eq!((&a + &b).number, dec!(59.75));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount {
    /// The decimal quantity
    pub number: Decimal,
    /// The currency code (e.g. "USD", "GOOG")
    pub currency: String,
}

impl Amount {
    /// Create a new amount.
    #[must_use]
    pub fn new(number: Decimal, currency: impl Into<String>) -> Self {
        Self {
            number,
            currency: currency.into(),
        }
    }

    /// Zero of the given currency.
    #[must_use]
    pub fn zero(currency: impl Into<String>) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// True if the number is exactly zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.number.is_zero()
    }

    /// True if strictly negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.number < Decimal::ZERO
    }

    /// Tolerance implied by the number of decimal places written.
    ///
    /// Half of the last written digit: `100` gives 0.5, `100.00` gives 0.005.
    /// Numbers written at the full 28 places get the finest representable
    /// tolerance.
    #[must_use]
    pub fn inferred_tolerance(&self) -> Decimal {
        Decimal::new(5, (self.number.scale() + 1).min(MAX_SCALE))
    }

    /// Same currency and within `tolerance` of `other`.
    #[must_use]
    pub fn is_near(&self, other: &Self, tolerance: Decimal) -> bool {
        self.currency == other.currency
            && self
                .number
                .checked_sub(other.number)
                .is_some_and(|difference| difference.abs() <= tolerance)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.currency)
    }
}

impl Add for &Amount {
    type Output = Amount;

    fn add(self, other: &Amount) -> Amount {
        debug_assert_eq!(self.currency, other.currency);
        Amount::new(self.number + other.number, self.currency.clone())
    }
}

impl Sub for &Amount {
    type Output = Amount;

    fn sub(self, other: &Amount) -> Amount {
        debug_assert_eq!(self.currency, other.currency);
        Amount::new(self.number - other.number, self.currency.clone())
    }
}

impl Neg for &Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount::new(-self.number, self.currency.clone())
    }
}

impl Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.number, self.currency)
    }
}
