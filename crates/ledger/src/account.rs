//! Account records
//!
//! `AccountState` is the live, lock-protected record owned by the store.
//! `AccountSnapshot` is the read-only copy handed to everything else.

use chrono::{DateTime, Utc};
use lendbook_core::{AccountId, Amount, Asset, MAX_AMOUNT};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::balance::{BalanceDelta, BalanceKind};
use crate::error::LedgerError;

/// Live account record
///
/// Zero balances are never stored: a balance that reaches zero is removed
/// together with its accrual timestamp.
#[derive(Debug, Clone)]
pub struct AccountState {
    id: AccountId,
    balances: BTreeMap<(BalanceKind, Asset), Decimal>,
    accrued_at: BTreeMap<(BalanceKind, Asset), DateTime<Utc>>,
    interest_earned: BTreeMap<Asset, Decimal>,
    interest_charged: BTreeMap<Asset, Decimal>,
}

impl AccountState {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            balances: BTreeMap::new(),
            accrued_at: BTreeMap::new(),
            interest_earned: BTreeMap::new(),
            interest_charged: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &AccountId {
        &self.id
    }

    /// Balance of one book (zero if absent)
    pub fn balance(&self, kind: BalanceKind, asset: &Asset) -> Decimal {
        self.balances
            .get(&(kind, asset.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Assets with a non-zero balance of `kind`
    pub fn assets(&self, kind: BalanceKind) -> Vec<Asset> {
        self.balances
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, asset)| asset.clone())
            .collect()
    }

    /// Last instant interest was brought current for this balance
    pub fn accrued_at(&self, kind: BalanceKind, asset: &Asset) -> Option<DateTime<Utc>> {
        self.accrued_at.get(&(kind, asset.clone())).copied()
    }

    /// An account with no balances is logically deleted
    pub fn is_active(&self) -> bool {
        !self.balances.is_empty()
    }

    /// Never held a balance worth remembering: no balances and no interest history
    pub fn is_pristine(&self) -> bool {
        self.balances.is_empty()
            && self.accrued_at.is_empty()
            && self.interest_earned.is_empty()
            && self.interest_charged.is_empty()
    }

    /// Compute post-delta balances without committing them
    fn projected_balances(
        &self,
        delta: &BalanceDelta,
    ) -> Result<BTreeMap<(BalanceKind, Asset), Decimal>, LedgerError> {
        let mut projected = self.balances.clone();

        for (kind, asset, change) in delta.iter() {
            if change.is_zero() {
                continue;
            }
            let current = self.balance(kind, asset);
            let next = current.checked_add(change).ok_or_else(|| {
                LedgerError::InvariantViolation(format!(
                    "{kind} balance of {asset} overflowed for {}",
                    self.id
                ))
            })?;

            if next > MAX_AMOUNT {
                return Err(LedgerError::BalanceLimitExceeded {
                    account: self.id.clone(),
                    kind,
                    asset: asset.clone(),
                    limit: MAX_AMOUNT,
                    requested: next,
                });
            }
            if next < Decimal::ZERO {
                return Err(LedgerError::InsufficientBalance {
                    account: self.id.clone(),
                    kind,
                    asset: asset.clone(),
                    available: current,
                    requested: -change,
                });
            }

            if next.is_zero() {
                projected.remove(&(kind, asset.clone()));
            } else {
                projected.insert((kind, asset.clone()), next);
            }
        }

        Ok(projected)
    }

    /// Snapshot of the state as it would be after `delta`
    pub fn project(&self, delta: &BalanceDelta) -> Result<AccountSnapshot, LedgerError> {
        let mut next = self.clone();
        next.balances = self.projected_balances(delta)?;
        Ok(next.snapshot())
    }

    /// Apply all lines of `delta` or none of them
    ///
    /// Balances that start from zero begin accruing at `at`; balances that
    /// reach zero drop their accrual timestamp.
    pub fn apply(&mut self, delta: &BalanceDelta, at: DateTime<Utc>) -> Result<(), LedgerError> {
        let projected = self.projected_balances(delta)?;

        for (kind, asset, _) in delta.iter() {
            if !kind.accrues_interest() {
                continue;
            }
            let key = (kind, asset.clone());
            if projected.contains_key(&key) {
                self.accrued_at.entry(key).or_insert(at);
            } else {
                self.accrued_at.remove(&key);
            }
        }

        self.balances = projected;
        Ok(())
    }

    /// Record accrued interest for a debt or savings balance
    ///
    /// `interest` must be non-negative and `now` must not move the accrual
    /// timestamp backwards.
    pub fn record_accrual(
        &mut self,
        kind: BalanceKind,
        asset: &Asset,
        interest: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, LedgerError> {
        if !kind.accrues_interest() {
            return Err(LedgerError::InvariantViolation(format!(
                "{kind} balances do not accrue interest"
            )));
        }
        if interest < Decimal::ZERO {
            return Err(LedgerError::InvariantViolation(format!(
                "negative interest {interest} on {kind} {asset} for {}",
                self.id
            )));
        }

        let key = (kind, asset.clone());
        if let Some(previous) = self.accrued_at.get(&key) {
            if now < *previous {
                return Err(LedgerError::InvariantViolation(format!(
                    "accrual timestamp for {kind} {asset} would move backwards"
                )));
            }
        }

        let Some(balance) = self.balances.get_mut(&key) else {
            return Ok(Decimal::ZERO);
        };
        let new_balance = balance
            .checked_add(interest)
            .filter(|next| *next <= MAX_AMOUNT)
            .ok_or_else(|| {
                LedgerError::InvariantViolation(format!(
                    "{kind} balance of {asset} for {} would exceed {MAX_AMOUNT} after interest",
                    self.id
                ))
            })?;
        *balance = new_balance;
        self.accrued_at.insert(key, now);

        if !interest.is_zero() {
            let totals = match kind {
                BalanceKind::Savings => &mut self.interest_earned,
                _ => &mut self.interest_charged,
            };
            *totals.entry(asset.clone()).or_insert(Decimal::ZERO) += interest;
        }

        Ok(new_balance)
    }

    /// Read-only copy of the record
    pub fn snapshot(&self) -> AccountSnapshot {
        let mut snapshot = AccountSnapshot::empty(self.id.clone());

        for ((kind, asset), value) in &self.balances {
            let amount = Amount::new_unchecked(*value);
            match kind {
                BalanceKind::Collateral => snapshot.collateral.insert(asset.clone(), amount),
                BalanceKind::Debt => snapshot.debt.insert(asset.clone(), amount),
                BalanceKind::Savings => snapshot.savings.insert(asset.clone(), amount),
            };
        }

        for ((kind, asset), at) in &self.accrued_at {
            match kind {
                BalanceKind::Debt => snapshot.debt_accrued_at.insert(asset.clone(), *at),
                BalanceKind::Savings => snapshot.savings_accrued_at.insert(asset.clone(), *at),
                BalanceKind::Collateral => None,
            };
        }

        snapshot.interest_earned = self.interest_earned.clone();
        snapshot.interest_charged = self.interest_charged.clone();
        snapshot.active = self.is_active();
        snapshot
    }
}

/// Read-only view of an account, safe to hand to presentation layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account: AccountId,
    pub collateral: BTreeMap<Asset, Amount>,
    pub debt: BTreeMap<Asset, Amount>,
    pub savings: BTreeMap<Asset, Amount>,
    pub debt_accrued_at: BTreeMap<Asset, DateTime<Utc>>,
    pub savings_accrued_at: BTreeMap<Asset, DateTime<Utc>>,
    /// Lifetime interest credited to savings, kept after balances reach zero
    pub interest_earned: BTreeMap<Asset, Decimal>,
    /// Lifetime interest charged to debt, kept after balances reach zero
    pub interest_charged: BTreeMap<Asset, Decimal>,
    pub active: bool,
}

impl AccountSnapshot {
    pub fn empty(account: AccountId) -> Self {
        Self {
            account,
            collateral: BTreeMap::new(),
            debt: BTreeMap::new(),
            savings: BTreeMap::new(),
            debt_accrued_at: BTreeMap::new(),
            savings_accrued_at: BTreeMap::new(),
            interest_earned: BTreeMap::new(),
            interest_charged: BTreeMap::new(),
            active: false,
        }
    }

    pub fn balances(&self, kind: BalanceKind) -> &BTreeMap<Asset, Amount> {
        match kind {
            BalanceKind::Collateral => &self.collateral,
            BalanceKind::Debt => &self.debt,
            BalanceKind::Savings => &self.savings,
        }
    }

    pub fn balance(&self, kind: BalanceKind, asset: &Asset) -> Amount {
        self.balances(kind).get(asset).copied().unwrap_or(Amount::ZERO)
    }

    pub fn has_debt(&self) -> bool {
        !self.debt.is_empty()
    }
}
