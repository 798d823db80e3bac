//! Interest Accrual
//!
//! Debt and savings balances grow by continuous compounding:
//! `balance * e^(rate * elapsed / year)`. The exponential is evaluated in
//! decimal arithmetic (`MathematicalOps::checked_exp`) so every node computes
//! the same digits, and overflow surfaces as an error instead of a panic.
//! Interest charged to a debtor rounds up; interest credited to a saver
//! rounds down.

use chrono::{DateTime, Duration, Utc};
use lendbook_core::{round_down, round_up, Asset};
use lendbook_ledger::{AccountGuard, BalanceKind};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::MarketConfig;
use crate::error::RiskError;

/// 365-day year, in milliseconds
pub const MILLISECONDS_PER_YEAR: i64 = 365 * 24 * 60 * 60 * 1_000;

/// Growth factor `e^(annual_rate * elapsed_ms / year)`
///
/// Returns exactly 1 for a zero rate or non-positive elapsed time.
pub fn growth_factor(annual_rate: Decimal, elapsed_ms: i64) -> Result<Decimal, RiskError> {
    if annual_rate <= Decimal::ZERO || elapsed_ms <= 0 {
        return Ok(Decimal::ONE);
    }

    annual_rate
        .checked_mul(Decimal::from(elapsed_ms))
        .and_then(|scaled| scaled.checked_div(Decimal::from(MILLISECONDS_PER_YEAR)))
        .and_then(|x| x.checked_exp())
        .ok_or(RiskError::Overflow("interest growth factor"))
}

/// One accrual step, as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualRecord {
    pub kind: BalanceKind,
    pub asset: Asset,
    pub interest: Decimal,
    pub balance_after: Decimal,
}

/// Interest accrual engine
#[derive(Debug, Clone)]
pub struct InterestAccrual {
    config: Arc<MarketConfig>,
}

impl InterestAccrual {
    pub fn new(config: Arc<MarketConfig>) -> Self {
        Self { config }
    }

    /// Annual rate applying to a balance kind
    pub fn annual_rate(&self, kind: BalanceKind, asset: &Asset) -> Result<Decimal, RiskError> {
        let cfg = self.config.asset(asset)?;
        Ok(match kind {
            BalanceKind::Debt => cfg.borrow_apr,
            BalanceKind::Savings => cfg.savings_apy,
            BalanceKind::Collateral => Decimal::ZERO,
        })
    }

    /// Interest owed on `principal` over `elapsed_ms`, rounded for `kind`
    pub fn interest_due(
        &self,
        kind: BalanceKind,
        principal: Decimal,
        annual_rate: Decimal,
        elapsed_ms: i64,
    ) -> Result<Decimal, RiskError> {
        let growth = growth_factor(annual_rate, elapsed_ms)? - Decimal::ONE;
        let raw = principal
            .checked_mul(growth)
            .ok_or(RiskError::Overflow("interest due"))?;
        Ok(match kind {
            BalanceKind::Debt => round_up(raw),
            _ => round_down(raw),
        })
    }

    /// Bring one balance current at `now` and return the new balance
    ///
    /// No-op when `now` is not after the last accrual, so repeated calls with
    /// the same `now` never charge twice.
    pub fn accrue(
        &self,
        guard: &mut AccountGuard,
        asset: &Asset,
        kind: BalanceKind,
        now: DateTime<Utc>,
    ) -> Result<Decimal, RiskError> {
        Ok(self
            .accrue_one(guard, asset, kind, now)?
            .map(|record| record.balance_after)
            .unwrap_or_else(|| guard.state().balance(kind, asset)))
    }

    fn accrue_one(
        &self,
        guard: &mut AccountGuard,
        asset: &Asset,
        kind: BalanceKind,
        now: DateTime<Utc>,
    ) -> Result<Option<AccrualRecord>, RiskError> {
        if !kind.accrues_interest() {
            return Ok(None);
        }
        let Some(last) = guard.state().accrued_at(kind, asset) else {
            return Ok(None);
        };
        let elapsed_ms = now.signed_duration_since(last).num_milliseconds();
        if elapsed_ms <= 0 {
            return Ok(None);
        }

        let principal = guard.state().balance(kind, asset);
        let rate = self.annual_rate(kind, asset)?;
        let interest = self.interest_due(kind, principal, rate, elapsed_ms)?;

        // Sub-millisecond remainders stay pending for the next accrual
        let accrued_to = last + Duration::milliseconds(elapsed_ms);
        let balance_after = guard.record_accrual(kind, asset, interest, accrued_to)?;
        tracing::debug!(
            account = %guard.id(),
            asset = %asset,
            kind = %kind,
            interest = %interest,
            "interest accrued"
        );

        Ok(Some(AccrualRecord {
            kind,
            asset: asset.clone(),
            interest,
            balance_after,
        }))
    }

    /// Bring every debt and savings balance of the account current
    pub fn accrue_all(
        &self,
        guard: &mut AccountGuard,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccrualRecord>, RiskError> {
        let mut records = Vec::new();
        for kind in [BalanceKind::Debt, BalanceKind::Savings] {
            for asset in guard.state().assets(kind) {
                if let Some(record) = self.accrue_one(guard, &asset, kind, now)? {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    /// Simple-interest estimate for `days`, e.g. the monthly cost of a new loan
    pub fn projected_interest(amount: Decimal, annual_rate: Decimal, days: u32) -> Decimal {
        round_up(amount * annual_rate * Decimal::from(days) / Decimal::from(365))
    }

    /// `amount * rate / 12`, the per-month figure quoted to borrowers
    pub fn monthly_interest(amount: Decimal, annual_rate: Decimal) -> Decimal {
        round_up(amount * annual_rate / Decimal::from(12))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lendbook_core::{AccountId, Amount};
    use lendbook_ledger::{BalanceDelta, LedgerStore};
    use rust_decimal_macros::dec;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn accrual() -> InterestAccrual {
        InterestAccrual::new(Arc::new(MarketConfig::demo()))
    }

    async fn store_with(kind: BalanceKind, asset: Asset, value: Decimal, at: DateTime<Utc>) -> LedgerStore {
        let store = LedgerStore::default();
        store
            .apply_delta(
                &AccountId::from("alice"),
                &BalanceDelta::new().credit(kind, asset, amount(value)),
                at,
            )
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_growth_factor_identity() {
        assert_eq!(growth_factor(Decimal::ZERO, 1_000_000).unwrap(), Decimal::ONE);
        assert_eq!(growth_factor(dec!(0.05), 0).unwrap(), Decimal::ONE);
        assert_eq!(growth_factor(dec!(0.05), -10).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_growth_factor_one_year() {
        // e^0.038 = 1.038731...
        let factor = growth_factor(dec!(0.038), MILLISECONDS_PER_YEAR).unwrap();
        assert!(factor > dec!(1.03873) && factor < dec!(1.03874), "{factor}");
    }

    #[test]
    fn test_growth_factor_over_many_years() {
        // 50% for four years: e^2 = 7.389056098930650227...
        let factor = growth_factor(dec!(0.5), 4 * MILLISECONDS_PER_YEAR).unwrap();
        let expected = dec!(7.389056098930650227230427461);
        assert!((factor - expected).abs() < dec!(0.000000000000001), "{factor}");

        // 100% for twenty years: e^20 = 485165195.40979...
        let factor = growth_factor(Decimal::ONE, 20 * MILLISECONDS_PER_YEAR).unwrap();
        assert!((factor - dec!(485165195.4097902779691068305)).abs() < dec!(0.000001), "{factor}");
    }

    #[test]
    fn test_growth_factor_overflow_is_an_error() {
        let result = growth_factor(dec!(1000), 100 * MILLISECONDS_PER_YEAR);
        assert!(matches!(result, Err(RiskError::Overflow(_))));
    }

    #[test]
    fn test_growth_factor_monotonic() {
        let mut previous = Decimal::ONE;
        for days in [1i64, 7, 30, 90, 365, 3650] {
            let factor = growth_factor(dec!(0.052), days * 86_400_000).unwrap();
            assert!(factor > previous);
            previous = factor;
        }
    }

    #[test]
    fn test_rounding_direction() {
        let accrual = accrual();
        // 1 wei-scale unit at 3.8% for one second: debt rounds up, savings down
        let tiny = dec!(0.000000000000000001);
        assert_eq!(
            accrual.interest_due(BalanceKind::Debt, tiny, dec!(0.038), 1_000).unwrap(),
            tiny
        );
        assert_eq!(
            accrual.interest_due(BalanceKind::Savings, tiny, dec!(0.038), 1_000).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_monthly_interest_quote() {
        // 1200 DAI at 3.8% APR = 3.80 DAI/month
        assert_eq!(InterestAccrual::monthly_interest(dec!(1200), dec!(0.038)), dec!(3.8));
        assert_eq!(
            InterestAccrual::projected_interest(dec!(365), dec!(0.1), 30),
            dec!(3)
        );
    }

    #[tokio::test]
    async fn test_accrue_is_idempotent() {
        let start = Utc::now();
        let store = store_with(BalanceKind::Debt, Asset::dai(), dec!(1200), start).await;
        let accrual = accrual();
        let later = start + Duration::days(30);

        let mut guard = store.lock(&AccountId::from("alice")).await;
        let first = accrual.accrue(&mut guard, &Asset::dai(), BalanceKind::Debt, later).unwrap();
        let second = accrual.accrue(&mut guard, &Asset::dai(), BalanceKind::Debt, later).unwrap();

        assert!(first > dec!(1200));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_accrue_ignores_past_now() {
        let start = Utc::now();
        let store = store_with(BalanceKind::Savings, Asset::dai(), dec!(850), start).await;
        let accrual = accrual();

        let mut guard = store.lock(&AccountId::from("alice")).await;
        let balance = accrual
            .accrue(&mut guard, &Asset::dai(), BalanceKind::Savings, start - Duration::hours(1))
            .unwrap();

        assert_eq!(balance, dec!(850));
        assert_eq!(guard.state().accrued_at(BalanceKind::Savings, &Asset::dai()), Some(start));
    }

    #[tokio::test]
    async fn test_accrue_monotonic_in_now() {
        let start = Utc::now();
        let accrual = accrual();
        let mut previous = dec!(850);

        for days in [1i64, 10, 100, 365] {
            let store = store_with(BalanceKind::Savings, Asset::dai(), dec!(850), start).await;
            let mut guard = store.lock(&AccountId::from("alice")).await;
            let balance = accrual
                .accrue(&mut guard, &Asset::dai(), BalanceKind::Savings, start + Duration::days(days))
                .unwrap();
            assert!(balance >= previous);
            previous = balance;
        }

        // 850 DAI at 4.8% for a year earns a little over 41.79
        assert!(previous > dec!(891.79) && previous < dec!(891.80), "{previous}");
    }

    #[tokio::test]
    async fn test_collateral_never_accrues() {
        let start = Utc::now();
        let store = store_with(BalanceKind::Collateral, Asset::eth(), dec!(2), start).await;
        let accrual = accrual();

        let mut guard = store.lock(&AccountId::from("alice")).await;
        let records = accrual.accrue_all(&mut guard, start + Duration::days(365)).unwrap();

        assert!(records.is_empty());
        assert_eq!(guard.state().balance(BalanceKind::Collateral, &Asset::eth()), dec!(2));
    }

    #[tokio::test]
    async fn test_accrue_all_reports_each_balance() {
        let start = Utc::now();
        let store = store_with(BalanceKind::Debt, Asset::dai(), dec!(1200), start).await;
        store
            .apply_delta(
                &AccountId::from("alice"),
                &BalanceDelta::new().credit(BalanceKind::Savings, Asset::eth(), amount(dec!(1.5))),
                start,
            )
            .await
            .unwrap();
        let accrual = accrual();

        let mut guard = store.lock(&AccountId::from("alice")).await;
        let records = accrual.accrue_all(&mut guard, start + Duration::days(30)).unwrap();

        assert_eq!(records.len(), 2);
        let snapshot = guard.snapshot();
        assert!(snapshot.interest_charged[&Asset::dai()] > Decimal::ZERO);
        assert!(snapshot.interest_earned[&Asset::eth()] > Decimal::ZERO);
    }
}
