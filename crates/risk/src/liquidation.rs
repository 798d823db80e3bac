//! Liquidation sizing
//!
//! A liquidator repays part of an unhealthy position's debt and receives
//! collateral worth the repaid value plus a bonus. At most `close_factor` of
//! the chosen debt is closed per call. When the borrower does not hold enough
//! of the chosen collateral, the repayment shrinks so the bonus still holds.

use lendbook_core::{round_down, Amount, Asset};
use lendbook_ledger::{AccountSnapshot, BalanceKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::MarketConfig;
use crate::engine::{Prices, RiskEngine, RiskReport};
use crate::error::RiskError;

/// Amounts moved by one liquidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationPlan {
    pub debt_asset: Asset,
    pub collateral_asset: Asset,
    /// Debt removed from the borrower, paid by the liquidator
    pub debt_repaid: Amount,
    /// Collateral moved from the borrower to the liquidator
    pub collateral_seized: Amount,
    /// True when seizure was limited by the borrower's collateral balance
    pub capped: bool,
}

#[derive(Debug, Clone)]
pub struct LiquidationPlanner {
    config: Arc<MarketConfig>,
}

impl LiquidationPlanner {
    pub fn new(config: Arc<MarketConfig>) -> Self {
        Self { config }
    }

    fn not_liquidatable(report: &RiskReport) -> RiskError {
        RiskError::PositionNotLiquidatable {
            ratio: report.collateral_ratio,
            threshold: report.liquidation_threshold,
        }
    }

    fn largest(
        snapshot: &AccountSnapshot,
        kind: BalanceKind,
        prices: &Prices,
    ) -> Option<Asset> {
        snapshot
            .balances(kind)
            .iter()
            .filter_map(|(asset, amount)| {
                prices
                    .get(asset)
                    .map(|price| (asset, amount.value().checked_mul(*price).unwrap_or(Decimal::MAX)))
            })
            .max_by(|a, b| a.1.cmp(&b.1))
            .map(|(asset, _)| asset.clone())
    }

    /// Largest-value debt and largest-value collateral of the position
    ///
    /// Debt with no collateral at all classifies as liquidatable (ratio 0) but
    /// leaves nothing to seize; that fails with `NothingToSeize`, not
    /// `PositionNotLiquidatable`.
    pub fn select_pair(
        &self,
        snapshot: &AccountSnapshot,
        prices: &Prices,
        report: &RiskReport,
    ) -> Result<(Asset, Asset), RiskError> {
        let debt = Self::largest(snapshot, BalanceKind::Debt, prices);
        let collateral = Self::largest(snapshot, BalanceKind::Collateral, prices);
        match (debt, collateral) {
            (Some(debt), Some(collateral)) => Ok((debt, collateral)),
            (Some(_), None) if snapshot.collateral.is_empty() => Err(RiskError::NothingToSeize {
                account: snapshot.account.clone(),
            }),
            _ => Err(Self::not_liquidatable(report)),
        }
    }

    /// Size a liquidation of `debt_asset` against `collateral_asset`
    ///
    /// Fails with `PositionNotLiquidatable` if the report does not classify the
    /// position as liquidatable or nothing can be repaid.
    pub fn plan(
        &self,
        snapshot: &AccountSnapshot,
        prices: &Prices,
        report: &RiskReport,
        debt_asset: &Asset,
        collateral_asset: &Asset,
    ) -> Result<LiquidationPlan, RiskError> {
        RiskEngine::ensure_liquidatable(report)?;
        if snapshot.collateral.is_empty() {
            return Err(RiskError::NothingToSeize {
                account: snapshot.account.clone(),
            });
        }

        let debt = snapshot.balance(BalanceKind::Debt, debt_asset).value();
        let collateral = snapshot.balance(BalanceKind::Collateral, collateral_asset).value();
        if debt.is_zero() || collateral.is_zero() {
            return Err(Self::not_liquidatable(report));
        }

        let debt_price = price(prices, debt_asset)?;
        let collateral_price = price(prices, collateral_asset)?;
        let bonus = Decimal::ONE + self.config.liquidation_bonus;

        let overflow = || RiskError::Overflow("liquidation size");

        let mut repaid = round_down(debt.checked_mul(self.config.close_factor).ok_or_else(overflow)?);
        let wanted = repaid
            .checked_mul(debt_price)
            .and_then(|value| value.checked_mul(bonus))
            .and_then(|value| value.checked_div(collateral_price))
            .ok_or_else(overflow)?;

        let (seized, capped) = if wanted > collateral {
            let covered = collateral
                .checked_mul(collateral_price)
                .and_then(|value| value.checked_div(bonus.checked_mul(debt_price)?))
                .ok_or_else(overflow)?;
            repaid = round_down(covered).min(debt);
            (collateral, true)
        } else {
            (round_down(wanted), false)
        };

        if repaid.is_zero() {
            return Err(Self::not_liquidatable(report));
        }

        Ok(LiquidationPlan {
            debt_asset: debt_asset.clone(),
            collateral_asset: collateral_asset.clone(),
            debt_repaid: Amount::new_unchecked(repaid.normalize()),
            collateral_seized: Amount::new_unchecked(seized.normalize()),
            capped,
        })
    }
}

fn price(prices: &Prices, asset: &Asset) -> Result<Decimal, RiskError> {
    prices
        .get(asset)
        .copied()
        .ok_or_else(|| RiskError::OracleUnavailable {
            reason: format!("no price loaded for {asset}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lendbook_core::AccountId;
    use rust_decimal_macros::dec;

    fn config() -> Arc<MarketConfig> {
        Arc::new(MarketConfig::demo())
    }

    fn position(collateral_eth: Decimal, debt_dai: Decimal) -> AccountSnapshot {
        let mut snapshot = AccountSnapshot::empty(AccountId::from("bob"));
        snapshot.collateral.insert(Asset::eth(), Amount::new(collateral_eth).unwrap());
        snapshot.debt.insert(Asset::dai(), Amount::new(debt_dai).unwrap());
        snapshot.active = true;
        snapshot
    }

    fn prices(eth: Decimal) -> Prices {
        Prices::from([(Asset::eth(), eth), (Asset::dai(), Decimal::ONE)])
    }

    fn plan_for(snapshot: &AccountSnapshot, prices: &Prices) -> Result<LiquidationPlan, RiskError> {
        let risk = RiskEngine::new(config());
        let planner = LiquidationPlanner::new(config());
        let report = risk.report(snapshot, prices)?;
        let (debt, collateral) = planner.select_pair(snapshot, prices, &report)?;
        planner.plan(snapshot, prices, &report, &debt, &collateral)
    }

    #[test]
    fn test_half_debt_closed_with_bonus() {
        // 600 DAI × 1.05 / 720 = 0.875 ETH
        let snapshot = position(dec!(2), dec!(1200));
        let plan = plan_for(&snapshot, &prices(dec!(720))).unwrap();

        assert_eq!(plan.debt_asset, Asset::dai());
        assert_eq!(plan.collateral_asset, Asset::eth());
        assert_eq!(plan.debt_repaid.value(), dec!(600));
        assert_eq!(plan.collateral_seized.value(), dec!(0.875));
        assert!(!plan.capped);
    }

    #[test]
    fn test_seizure_capped_at_collateral() {
        // 0.5 ETH × 720 = 360 of collateral against 1200 DAI
        let snapshot = position(dec!(0.5), dec!(1200));
        let plan = plan_for(&snapshot, &prices(dec!(720))).unwrap();

        assert!(plan.capped);
        assert_eq!(plan.collateral_seized.value(), dec!(0.5));
        assert_eq!(plan.debt_repaid.value(), dec!(342.857142857142857142));
        // bonus preserved: seized value >= repaid × 1.05
        assert!(dec!(360) >= plan.debt_repaid.value() * dec!(1.05));
    }

    #[test]
    fn test_healthy_position_rejected() {
        let snapshot = position(dec!(2), dec!(1200));
        let result = plan_for(&snapshot, &prices(dec!(1640)));
        assert!(matches!(result, Err(RiskError::PositionNotLiquidatable { .. })));
    }

    #[test]
    fn test_missing_collateral_asset_rejected() {
        let snapshot = position(dec!(2), dec!(1200));
        let prices = prices(dec!(720));
        let risk = RiskEngine::new(config());
        let planner = LiquidationPlanner::new(config());
        let report = risk.report(&snapshot, &prices).unwrap();

        let result = planner.plan(&snapshot, &prices, &report, &Asset::dai(), &Asset::dai());
        assert!(matches!(result, Err(RiskError::PositionNotLiquidatable { .. })));
    }

    #[test]
    fn test_selects_largest_value_debt() {
        let mut snapshot = position(dec!(2), dec!(100));
        snapshot.debt.insert(Asset::eth(), Amount::new(dec!(1.5)).unwrap());
        let prices = prices(dec!(720));

        let risk = RiskEngine::new(config());
        let planner = LiquidationPlanner::new(config());
        let report = risk.report(&snapshot, &prices).unwrap();
        let (debt, collateral) = planner.select_pair(&snapshot, &prices, &report).unwrap();

        // 1.5 ETH × 720 = 1080 outweighs 100 DAI
        assert_eq!(debt, Asset::eth());
        assert_eq!(collateral, Asset::eth());
    }

    #[test]
    fn test_debt_without_collateral_has_nothing_to_seize() {
        let mut snapshot = AccountSnapshot::empty(AccountId::from("bob"));
        snapshot.debt.insert(Asset::dai(), Amount::new(dec!(10)).unwrap());
        snapshot.active = true;
        let prices = prices(dec!(720));

        let risk = RiskEngine::new(config());
        let report = risk.report(&snapshot, &prices).unwrap();
        assert_eq!(report.level, crate::RiskLevel::Liquidatable);

        let planner = LiquidationPlanner::new(config());
        let selected = planner.select_pair(&snapshot, &prices, &report);
        assert!(matches!(selected, Err(RiskError::NothingToSeize { .. })));

        let planned = planner.plan(&snapshot, &prices, &report, &Asset::dai(), &Asset::eth());
        assert!(matches!(planned, Err(RiskError::NothingToSeize { .. })));
    }

    #[test]
    fn test_largest_position_sized_without_overflow() {
        use lendbook_core::{MAX_AMOUNT, MAX_PRICE};

        // 1e15 DAI at MAX_PRICE is worth 1e27 against 1e15 ETH at 1
        let snapshot = position(MAX_AMOUNT, MAX_AMOUNT);
        let prices = Prices::from([(Asset::eth(), Decimal::ONE), (Asset::dai(), MAX_PRICE)]);
        let plan = plan_for(&snapshot, &prices).unwrap();

        assert!(plan.capped);
        assert_eq!(plan.collateral_seized.value(), MAX_AMOUNT);
        assert!(plan.debt_repaid.value() < dec!(1000));
    }

    #[test]
    fn test_bonus_is_configurable() {
        let mut market = MarketConfig::demo();
        market.liquidation_bonus = dec!(0.10);
        let market = Arc::new(market);
        let snapshot = position(dec!(2), dec!(1200));
        let prices = prices(dec!(720));

        let report = RiskEngine::new(market.clone()).report(&snapshot, &prices).unwrap();
        let plan = LiquidationPlanner::new(market)
            .plan(&snapshot, &prices, &report, &Asset::dai(), &Asset::eth())
            .unwrap();

        // 600 × 1.10 / 720 = 0.91666...
        assert_eq!(plan.collateral_seized.value(), dec!(0.916666666666666666));
    }
}
