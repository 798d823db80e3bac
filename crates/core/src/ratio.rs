//! Collateralization ratio
//!
//! A ratio of collateral value to debt value, expressed as a percentage.
//! With no debt the ratio is undefined and treated as infinitely safe.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Percentage ratio with an infinite sentinel.
///
/// Ordering places `Infinite` above every finite value, so threshold checks
/// are plain comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollateralRatio {
    Finite(Decimal),
    Infinite,
}

impl CollateralRatio {
    /// `collateral / debt * 100`, or `Infinite` when `debt` is zero.
    ///
    /// Dust debt against large collateral saturates at `Decimal::MAX`.
    pub fn from_values(collateral_value: Decimal, debt_value: Decimal) -> Self {
        if debt_value <= Decimal::ZERO {
            return CollateralRatio::Infinite;
        }
        let ratio = collateral_value
            .checked_div(debt_value)
            .and_then(|quotient| quotient.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::MAX);
        CollateralRatio::Finite(ratio)
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, CollateralRatio::Infinite)
    }

    pub fn finite(&self) -> Option<Decimal> {
        match self {
            CollateralRatio::Finite(value) => Some(*value),
            CollateralRatio::Infinite => None,
        }
    }

    /// Lossy conversion for presentation layers only. Never compare thresholds with this.
    pub fn to_f64(&self) -> f64 {
        match self {
            CollateralRatio::Finite(value) => value.to_f64().unwrap_or(f64::MAX),
            CollateralRatio::Infinite => f64::INFINITY,
        }
    }

    /// Ratio divided by `threshold` percent (1.0 = exactly at threshold).
    pub fn scaled_by(&self, threshold: Decimal) -> Self {
        match self {
            CollateralRatio::Finite(value) if threshold > Decimal::ZERO => {
                CollateralRatio::Finite(value.checked_div(threshold).unwrap_or(Decimal::MAX))
            }
            _ => CollateralRatio::Infinite,
        }
    }
}

impl PartialOrd for CollateralRatio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CollateralRatio {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CollateralRatio::Infinite, CollateralRatio::Infinite) => Ordering::Equal,
            (CollateralRatio::Infinite, _) => Ordering::Greater,
            (_, CollateralRatio::Infinite) => Ordering::Less,
            (CollateralRatio::Finite(a), CollateralRatio::Finite(b)) => a.cmp(b),
        }
    }
}

impl PartialEq<Decimal> for CollateralRatio {
    fn eq(&self, other: &Decimal) -> bool {
        matches!(self, CollateralRatio::Finite(value) if value == other)
    }
}

impl PartialOrd<Decimal> for CollateralRatio {
    fn partial_cmp(&self, other: &Decimal) -> Option<Ordering> {
        match self {
            CollateralRatio::Finite(value) => value.partial_cmp(other),
            CollateralRatio::Infinite => Some(Ordering::Greater),
        }
    }
}

impl fmt::Display for CollateralRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollateralRatio::Finite(value) => write!(f, "{:.2}%", value),
            CollateralRatio::Infinite => write!(f, "∞"),
        }
    }
}
