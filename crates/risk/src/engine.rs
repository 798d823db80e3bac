//! Risk engine - valuation and collateralization policy
//!
//! Every figure a presentation layer shows about a position (values, ratio,
//! health, borrow limit, risk level) is computed here from a ledger snapshot
//! and a price map. Nothing is cached: the classification is recomputed on
//! every read, so displayed and enforced risk cannot drift apart.

use chrono::{DateTime, Utc};
use lendbook_core::{round_down, Asset, CollateralRatio, MAX_AMOUNT};
use lendbook_ledger::{AccountSnapshot, BalanceKind};
use lendbook_oracle::PriceOracle;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strum_macros::Display;

use crate::config::MarketConfig;
use crate::error::RiskError;

/// Asset prices in the reference unit
pub type Prices = BTreeMap<Asset, Decimal>;

/// Risk classification, derived on every read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// ratio >= safe threshold
    Safe,
    /// liquidation threshold < ratio < safe threshold
    Warning,
    /// ratio <= liquidation threshold
    Liquidatable,
}

/// Computed risk figures for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskReport {
    pub collateral_value: Decimal,
    pub debt_value: Decimal,
    /// Σ collateral value × collateral factor
    pub borrow_capacity: Decimal,
    /// borrow capacity − debt value, floored at zero
    pub available_to_borrow: Decimal,
    pub collateral_ratio: CollateralRatio,
    pub liquidation_threshold: Decimal,
    pub health_factor: CollateralRatio,
    pub level: RiskLevel,
}

/// Dashboard totals for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub collateral_value: Decimal,
    pub savings_value: Decimal,
    pub debt_value: Decimal,
    /// collateral + savings − debt
    pub net_value: Decimal,
}

#[derive(Debug, Clone)]
pub struct RiskEngine {
    config: Arc<MarketConfig>,
}

impl RiskEngine {
    pub fn new(config: Arc<MarketConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Assets whose prices are needed to value collateral and debt
    pub fn priced_assets(snapshot: &AccountSnapshot) -> BTreeSet<Asset> {
        snapshot
            .collateral
            .keys()
            .chain(snapshot.debt.keys())
            .cloned()
            .collect()
    }

    /// Read fresh prices for `assets`, failing closed on stale or missing data
    pub async fn fetch_prices<'a>(
        &self,
        oracle: &dyn PriceOracle,
        assets: impl IntoIterator<Item = &'a Asset>,
        now: DateTime<Utc>,
    ) -> Result<Prices, RiskError> {
        Ok(self
            .config
            .oracle_policy()
            .fetch_all(oracle, assets, now)
            .await?)
    }

    fn price(prices: &Prices, asset: &Asset) -> Result<Decimal, RiskError> {
        prices
            .get(asset)
            .copied()
            .ok_or_else(|| RiskError::OracleUnavailable {
                reason: format!("no price loaded for {asset}"),
            })
    }

    /// `amount × price`, failing on overflow
    fn value_of(amount: Decimal, price: Decimal) -> Result<Decimal, RiskError> {
        amount.checked_mul(price).ok_or(RiskError::Overflow("asset value"))
    }

    fn sum(total: Decimal, value: Decimal, what: &'static str) -> Result<Decimal, RiskError> {
        total.checked_add(value).ok_or(RiskError::Overflow(what))
    }

    fn book_value(
        &self,
        snapshot: &AccountSnapshot,
        kind: BalanceKind,
        prices: &Prices,
    ) -> Result<Decimal, RiskError> {
        snapshot
            .balances(kind)
            .iter()
            .try_fold(Decimal::ZERO, |total, (asset, amount)| {
                let value = Self::value_of(amount.value(), Self::price(prices, asset)?)?;
                Self::sum(total, value, "book value")
            })
    }

    /// Σ collateral[asset] × price(asset)
    pub fn collateral_value(&self, snapshot: &AccountSnapshot, prices: &Prices) -> Result<Decimal, RiskError> {
        self.book_value(snapshot, BalanceKind::Collateral, prices)
    }

    /// Σ debt[asset] × price(asset)
    pub fn debt_value(&self, snapshot: &AccountSnapshot, prices: &Prices) -> Result<Decimal, RiskError> {
        self.book_value(snapshot, BalanceKind::Debt, prices)
    }

    /// Σ savings[asset] × price(asset)
    pub fn savings_value(&self, snapshot: &AccountSnapshot, prices: &Prices) -> Result<Decimal, RiskError> {
        self.book_value(snapshot, BalanceKind::Savings, prices)
    }

    /// Σ collateral value × collateral factor
    pub fn borrow_capacity(&self, snapshot: &AccountSnapshot, prices: &Prices) -> Result<Decimal, RiskError> {
        snapshot
            .collateral
            .iter()
            .try_fold(Decimal::ZERO, |total, (asset, amount)| {
                let cfg = self.config.asset(asset)?;
                let value = Self::value_of(amount.value(), Self::price(prices, asset)?)?;
                let weighted = value
                    .checked_mul(cfg.collateral_factor)
                    .ok_or(RiskError::Overflow("borrow capacity"))?;
                Self::sum(total, weighted, "borrow capacity")
            })
    }

    /// collateral value / debt value × 100, infinite without debt
    pub fn collateral_ratio(&self, snapshot: &AccountSnapshot, prices: &Prices) -> Result<CollateralRatio, RiskError> {
        Ok(CollateralRatio::from_values(
            self.collateral_value(snapshot, prices)?,
            self.debt_value(snapshot, prices)?,
        ))
    }

    /// Collateral-value-weighted liquidation threshold
    ///
    /// Falls back to the highest configured threshold when the account holds no
    /// collateral value. Weights are value shares, so the sum stays within
    /// the largest threshold.
    pub fn liquidation_threshold(&self, snapshot: &AccountSnapshot, prices: &Prices) -> Result<Decimal, RiskError> {
        let mut values = Vec::with_capacity(snapshot.collateral.len());
        let mut total = Decimal::ZERO;

        for (asset, amount) in &snapshot.collateral {
            let value = Self::value_of(amount.value(), Self::price(prices, asset)?)?;
            total = Self::sum(total, value, "collateral value")?;
            values.push((value, self.config.asset(asset)?.liquidation_threshold));
        }

        if total.is_zero() {
            return Ok(self.config.max_liquidation_threshold());
        }

        values.into_iter().try_fold(Decimal::ZERO, |weighted, (value, threshold)| {
            let share = value
                .checked_div(total)
                .and_then(|share| share.checked_mul(threshold))
                .ok_or(RiskError::Overflow("liquidation threshold"))?;
            Self::sum(weighted, share, "liquidation threshold")
        })
    }

    /// Positions at or below the threshold may be liquidated
    pub fn is_liquidatable(ratio: CollateralRatio, threshold: Decimal) -> bool {
        ratio <= CollateralRatio::Finite(threshold)
    }

    pub fn classify(&self, ratio: CollateralRatio, threshold: Decimal) -> RiskLevel {
        if Self::is_liquidatable(ratio, threshold) {
            RiskLevel::Liquidatable
        } else if ratio >= CollateralRatio::Finite(self.config.safe_threshold) {
            RiskLevel::Safe
        } else {
            RiskLevel::Warning
        }
    }

    /// Ratio relative to the liquidation threshold (1.0 = liquidatable)
    pub fn health_factor(&self, snapshot: &AccountSnapshot, prices: &Prices) -> Result<CollateralRatio, RiskError> {
        let ratio = self.collateral_ratio(snapshot, prices)?;
        Ok(ratio.scaled_by(self.liquidation_threshold(snapshot, prices)?))
    }

    /// (borrow capacity − debt value) / price(asset), floored at zero
    pub fn max_borrowable(
        &self,
        snapshot: &AccountSnapshot,
        prices: &Prices,
        asset: &Asset,
    ) -> Result<Decimal, RiskError> {
        self.config.asset(asset)?;
        let headroom = self.borrow_capacity(snapshot, prices)? - self.debt_value(snapshot, prices)?;
        if headroom <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        // No balance may exceed MAX_AMOUNT, so neither may a borrow quote
        let units = headroom
            .checked_div(Self::price(prices, asset)?)
            .unwrap_or(MAX_AMOUNT);
        Ok(round_down(units.min(MAX_AMOUNT)))
    }

    pub fn report(&self, snapshot: &AccountSnapshot, prices: &Prices) -> Result<RiskReport, RiskError> {
        let collateral_value = self.collateral_value(snapshot, prices)?;
        let debt_value = self.debt_value(snapshot, prices)?;
        let borrow_capacity = self.borrow_capacity(snapshot, prices)?;
        let collateral_ratio = CollateralRatio::from_values(collateral_value, debt_value);
        let liquidation_threshold = self.liquidation_threshold(snapshot, prices)?;

        Ok(RiskReport {
            collateral_value,
            debt_value,
            borrow_capacity,
            available_to_borrow: (borrow_capacity - debt_value).max(Decimal::ZERO),
            collateral_ratio,
            liquidation_threshold,
            health_factor: collateral_ratio.scaled_by(liquidation_threshold),
            level: self.classify(collateral_ratio, liquidation_threshold),
        })
    }

    /// Totals across all books; needs prices for savings assets as well
    pub fn portfolio(&self, snapshot: &AccountSnapshot, prices: &Prices) -> Result<PortfolioSummary, RiskError> {
        let collateral_value = self.collateral_value(snapshot, prices)?;
        let savings_value = self.savings_value(snapshot, prices)?;
        let debt_value = self.debt_value(snapshot, prices)?;

        Ok(PortfolioSummary {
            collateral_value,
            savings_value,
            debt_value,
            net_value: Self::sum(collateral_value, savings_value, "net value")? - debt_value,
        })
    }

    /// Fail with `PositionNotLiquidatable` unless the report allows liquidation
    pub fn ensure_liquidatable(report: &RiskReport) -> Result<(), RiskError> {
        if report.level == RiskLevel::Liquidatable {
            Ok(())
        } else {
            Err(RiskError::PositionNotLiquidatable {
                ratio: report.collateral_ratio,
                threshold: report.liquidation_threshold,
            })
        }
    }
}
