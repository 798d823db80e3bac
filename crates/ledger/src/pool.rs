//! System liquidity pool
//!
//! Cash per asset: seeded reserves + savings deposits + repayments, minus
//! savings withdrawals and borrows. Only savings withdrawals are bounded by it.

use lendbook_core::{Amount, Asset};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::LedgerError;

#[derive(Debug, Default)]
pub struct LiquidityPool {
    cash: Mutex<HashMap<Asset, Decimal>>,
}

impl LiquidityPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cash available for withdrawals (never negative)
    pub fn available(&self, asset: &Asset) -> Decimal {
        self.cash
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO)
    }

    /// Savings deposits, repayments and seeded reserves
    pub fn supply(&self, asset: &Asset, amount: Amount) {
        let mut cash = self.cash.lock().unwrap_or_else(PoisonError::into_inner);
        let current = cash.entry(asset.clone()).or_insert(Decimal::ZERO);
        *current = current.saturating_add(amount.value());
    }

    /// Borrowed funds leave the pool unconditionally
    pub fn draw(&self, asset: &Asset, amount: Amount) {
        let mut cash = self.cash.lock().unwrap_or_else(PoisonError::into_inner);
        let current = cash.entry(asset.clone()).or_insert(Decimal::ZERO);
        *current = current.saturating_sub(amount.value());
    }

    /// Take cash for a savings withdrawal, failing if there is not enough
    pub fn withdraw(&self, asset: &Asset, amount: Amount) -> Result<(), LedgerError> {
        let mut cash = self.cash.lock().unwrap_or_else(PoisonError::into_inner);
        let current = cash.entry(asset.clone()).or_insert(Decimal::ZERO);

        if *current < amount.value() {
            return Err(LedgerError::InsufficientLiquidity {
                asset: asset.clone(),
                available: (*current).max(Decimal::ZERO),
                requested: amount.value(),
            });
        }

        *current -= amount.value();
        Ok(())
    }
}
