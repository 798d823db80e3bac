//! Balance kinds and signed deltas
//!
//! A `BalanceDelta` is the unit of change handed to the ledger. Lines with the
//! same (kind, asset) key are merged, so a delta never contains two changes to
//! one balance.

use lendbook_core::{Amount, Asset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};

/// Which book of an account a balance belongs to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BalanceKind {
    /// Pledged collateral, no interest
    Collateral,
    /// Borrowed principal plus charged interest
    Debt,
    /// Savings principal plus earned interest
    Savings,
}

impl BalanceKind {
    pub const ALL: [BalanceKind; 3] = [BalanceKind::Collateral, BalanceKind::Debt, BalanceKind::Savings];

    /// Debt and savings accrue interest; collateral does not.
    pub fn accrues_interest(&self) -> bool {
        matches!(self, BalanceKind::Debt | BalanceKind::Savings)
    }
}

/// One signed change inside a delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaLine {
    pub kind: BalanceKind,
    pub asset: Asset,
    pub change: Decimal,
}

/// Signed balance changes for a single account
///
/// # Example
/// ```
/// use lendbook_core::{Amount, Asset};
/// use lendbook_ledger::{BalanceDelta, BalanceKind};
/// use rust_decimal::Decimal;
///
/// let delta = BalanceDelta::new()
///     .debit(BalanceKind::Collateral, Asset::eth(), Amount::new(Decimal::ONE).unwrap())
///     .credit(BalanceKind::Collateral, Asset::eth(), Amount::new(Decimal::TWO).unwrap());
/// assert_eq!(delta.change(BalanceKind::Collateral, &Asset::eth()), Decimal::ONE);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceDelta {
    changes: BTreeMap<(BalanceKind, Asset), Decimal>,
}

impl BalanceDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increase a balance
    pub fn credit(mut self, kind: BalanceKind, asset: Asset, amount: Amount) -> Self {
        self.push(kind, asset, amount.value());
        self
    }

    /// Decrease a balance
    pub fn debit(mut self, kind: BalanceKind, asset: Asset, amount: Amount) -> Self {
        self.push(kind, asset, -amount.value());
        self
    }

    /// Add a raw signed change
    pub fn push(&mut self, kind: BalanceKind, asset: Asset, change: Decimal) {
        *self.changes.entry((kind, asset)).or_insert(Decimal::ZERO) += change;
    }

    /// Net change for one balance (zero if untouched)
    pub fn change(&self, kind: BalanceKind, asset: &Asset) -> Decimal {
        self.changes
            .get(&(kind, asset.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.values().all(|change| change.is_zero())
    }

    pub fn iter(&self) -> impl Iterator<Item = (BalanceKind, &Asset, Decimal)> {
        self.changes
            .iter()
            .map(|((kind, asset), change)| (*kind, asset, *change))
    }

    /// Lines for the audit journal (zero changes omitted)
    pub fn lines(&self) -> Vec<DeltaLine> {
        self.iter()
            .filter(|(_, _, change)| !change.is_zero())
            .map(|(kind, asset, change)| DeltaLine {
                kind,
                asset: asset.clone(),
                change,
            })
            .collect()
    }
}
