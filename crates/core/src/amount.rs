//! Amount - Non-negative fixed-point quantity
//!
//! Every balance in LendBook (collateral, debt, savings) is an `Amount`.
//! Values carry at most `AMOUNT_SCALE` fractional digits; anything finer is
//! rounded explicitly with `round_down` / `round_up` so that the direction of
//! every rounding step is a decision made by the caller.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of fractional digits kept for balances.
pub const AMOUNT_SCALE: u32 = 18;

/// Largest amount any single balance may hold: 10^15 units.
///
/// Keeps `balance × price` (prices are capped at `MAX_PRICE`) and the sums
/// built from it well inside `Decimal` range.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(2_764_472_320, 232_830, 0, false, 0);

/// Largest price an oracle quote may carry: 10^12 reference units.
pub const MAX_PRICE: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Errors that can occur when working with amounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount cannot be negative: {0}")]
    NegativeAmount(Decimal),

    #[error("Amount must be greater than zero: {0}")]
    NotPositive(Decimal),

    #[error("Amount exceeds the maximum of {MAX_AMOUNT}: {0}")]
    TooLarge(Decimal),
}

/// Round toward zero at `AMOUNT_SCALE` digits (protocol-favorable for credits).
pub fn round_down(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::ToZero)
}

/// Round away from zero at `AMOUNT_SCALE` digits (protocol-favorable for charges).
pub fn round_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::AwayFromZero)
}

/// A non-negative decimal amount.
///
/// # Invariant
/// The inner value is always >= 0 and has at most `AMOUNT_SCALE` fractional digits.
///
/// # Example
/// ```
/// use lendbook_core::Amount;
/// use rust_decimal::Decimal;
///
/// let amount = Amount::new(Decimal::new(25, 1)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(25, 1));
///
/// assert!(Amount::new(Decimal::new(-1, 0)).is_err());
/// assert!(Amount::positive(Decimal::ZERO).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Zero amount constant
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new Amount from a Decimal.
    ///
    /// Returns an error if the value is negative or above `MAX_AMOUNT`.
    /// Excess precision is rounded down.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value < Decimal::ZERO {
            Err(AmountError::NegativeAmount(value))
        } else if value > MAX_AMOUNT {
            Err(AmountError::TooLarge(value))
        } else {
            Ok(Self(round_down(value).normalize()))
        }
    }

    /// Create an Amount that must be strictly positive (operation inputs).
    pub fn positive(value: Decimal) -> Result<Self, AmountError> {
        let amount = Self::new(value)?;
        if amount.is_zero() {
            return Err(AmountError::NotPositive(value));
        }
        Ok(amount)
    }

    /// Create an Amount without validation.
    ///
    /// The caller MUST ensure the value is non-negative (ledger-held balances).
    #[inline]
    pub const fn new_unchecked(value: Decimal) -> Self {
        Self(value)
    }

    /// Get the inner Decimal value
    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// Check if the amount is zero
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns None above `MAX_AMOUNT`
    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        self.0
            .checked_add(other.0)
            .filter(|sum| *sum <= MAX_AMOUNT)
            .map(Amount)
    }

    /// Returns None if the result would be negative
    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        let result = self.0.checked_sub(other.0)?;
        if result < Decimal::ZERO {
            None
        } else {
            Some(Amount(result))
        }
    }

    pub fn min(self, other: Amount) -> Amount {
        if self <= other {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::ZERO
    }
}
