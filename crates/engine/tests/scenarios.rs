//! End-to-end position scenarios
//!
//! These tests drive `LendingEngine` through complete borrow, price-drop,
//! liquidation and repayment flows with a manual clock and scripted prices.

use chrono::{Duration, Utc};
use lendbook_core::{AccountId, Asset, CollateralRatio, MAX_AMOUNT, MAX_PRICE};
use lendbook_engine::{
    Clock, EngineError, LendingEngine, LiquidatorCredit, ManualClock, RiskView,
};
use lendbook_ledger::{LedgerEventKind, LedgerStore};
use lendbook_oracle::MockOracle;
use lendbook_risk::{MarketConfig, RiskLevel};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

struct Market {
    engine: Arc<LendingEngine>,
    oracle: Arc<MockOracle>,
    clock: Arc<ManualClock>,
}

impl Market {
    fn new() -> Self {
        Self::with_config(MarketConfig::demo())
    }

    fn with_config(config: MarketConfig) -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let oracle = Arc::new(MockOracle::new());
        let engine = LendingEngine::in_memory(config, oracle.clone(), clock.clone());
        let market = Self {
            engine: Arc::new(engine),
            oracle,
            clock,
        };
        market.set_price(Asset::eth(), dec!(1640));
        market.set_price(Asset::dai(), Decimal::ONE);
        market
    }

    /// Quote a price as of the market clock
    fn set_price(&self, asset: Asset, price: Decimal) {
        self.oracle.set_price_at(asset, price, self.clock.now());
    }

    /// Move time forward and refresh every quote at the new instant
    fn advance(&self, by: Duration, eth: Decimal) {
        self.clock.advance(by);
        self.set_price(Asset::eth(), eth);
        self.set_price(Asset::dai(), Decimal::ONE);
    }

    /// 2 ETH collateral with 1200 DAI borrowed
    async fn open_position(&self, account: &AccountId) {
        self.engine
            .deposit_collateral(account, &Asset::eth(), dec!(2))
            .await
            .unwrap();
        self.engine
            .borrow(account, &Asset::dai(), dec!(1200))
            .await
            .unwrap();
    }
}

fn alice() -> AccountId {
    AccountId::from("alice")
}

fn carol() -> AccountId {
    AccountId::from("carol")
}

/// Deposit 2 ETH at 1640, borrow 1200 DAI
#[tokio::test]
async fn test_borrow_against_eth_collateral() {
    let market = Market::new();
    let engine = &market.engine;

    engine
        .deposit_collateral(&alice(), &Asset::eth(), dec!(2))
        .await
        .unwrap();
    let max = engine.max_borrowable(&alice(), &Asset::dai()).await.unwrap();
    assert_eq!(max, dec!(2460));

    let position = engine.borrow(&alice(), &Asset::dai(), dec!(1200)).await.unwrap();
    let report = position.risk.report().unwrap();

    assert_eq!(report.collateral_value, dec!(3280));
    assert_eq!(report.debt_value, dec!(1200));
    assert_eq!(report.collateral_ratio.finite().unwrap().round_dp(2), dec!(273.33));
    assert_eq!(report.level, RiskLevel::Safe);
    assert_eq!(position.account.debt[&Asset::dai()].value(), dec!(1200));
}

/// ETH drops to 720: exactly 120%, liquidated at half the debt
#[tokio::test]
async fn test_price_drop_to_threshold_is_liquidated() {
    let market = Market::new();
    let engine = &market.engine;
    market.open_position(&alice()).await;

    market.set_price(Asset::eth(), dec!(720));
    let report = engine.risk_report(&alice()).await.unwrap();
    assert_eq!(report.collateral_value, dec!(1440));
    assert_eq!(report.collateral_ratio, dec!(120));
    assert_eq!(report.level, RiskLevel::Liquidatable);

    let candidates = engine.liquidatable_accounts().await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].account, alice());

    let outcome = engine.liquidate(&alice(), &carol()).await.unwrap();
    assert_eq!(outcome.plan.debt_asset, Asset::dai());
    assert_eq!(outcome.plan.collateral_asset, Asset::eth());
    assert_eq!(outcome.plan.debt_repaid.value(), dec!(600));
    // 600 / 720 × 1.05
    assert_eq!(outcome.plan.collateral_seized.value(), dec!(0.875));
    assert_eq!(outcome.credit, LiquidatorCredit::Applied);

    let borrower = &outcome.borrower.account;
    assert_eq!(borrower.debt[&Asset::dai()].value(), dec!(600));
    assert_eq!(borrower.collateral[&Asset::eth()].value(), dec!(1.125));
    // 810 / 600 = 135%
    assert_eq!(outcome.borrower.risk.level(), Some(RiskLevel::Warning));

    let liquidator = engine.snapshot(&carol()).await.unwrap();
    assert_eq!(liquidator.account.collateral[&Asset::eth()].value(), dec!(0.875));

    let again = engine.liquidate(&alice(), &carol()).await;
    assert!(matches!(again, Err(EngineError::PositionNotLiquidatable { .. })));
}

#[tokio::test]
async fn test_healthy_position_cannot_be_liquidated() {
    let market = Market::new();
    market.open_position(&alice()).await;

    let result = market.engine.liquidate(&alice(), &carol()).await;
    assert!(matches!(result, Err(EngineError::PositionNotLiquidatable { .. })));
    assert!(market.engine.liquidatable_accounts().await.unwrap().is_empty());

    let position = market.engine.snapshot(&alice()).await.unwrap();
    assert_eq!(position.account.debt[&Asset::dai()].value(), dec!(1200));
    assert_eq!(position.account.collateral[&Asset::eth()].value(), dec!(2));
}

#[tokio::test]
async fn test_liquidate_pair_caps_seizure_and_keeps_bonus() {
    let market = Market::new();
    let engine = &market.engine;
    market.open_position(&alice()).await;
    engine
        .deposit_collateral(&alice(), &Asset::dai(), dec!(100))
        .await
        .unwrap();

    market.set_price(Asset::eth(), dec!(600));
    let outcome = engine
        .liquidate_pair(&alice(), &carol(), &Asset::dai(), &Asset::dai())
        .await
        .unwrap();

    // only 100 DAI of collateral: 100 / 1.05 of debt repaid
    assert!(outcome.plan.capped);
    assert_eq!(outcome.plan.collateral_seized.value(), dec!(100));
    assert_eq!(outcome.plan.debt_repaid.value(), dec!(95.238095238095238095));
    assert!(!outcome.borrower.account.collateral.contains_key(&Asset::dai()));
}

/// Repay more than owed, then exactly what is owed
#[tokio::test]
async fn test_over_repayment_rejected_and_exact_repayment_clears_debt() {
    let market = Market::new();
    let engine = &market.engine;
    market.open_position(&alice()).await;

    let result = engine.repay(&alice(), &Asset::dai(), dec!(1300)).await;
    assert_eq!(
        result.unwrap_err(),
        EngineError::OverRepayment {
            asset: Asset::dai(),
            outstanding: dec!(1200),
            requested: dec!(1300),
        }
    );

    let unchanged = engine.snapshot(&alice()).await.unwrap();
    assert_eq!(unchanged.account.debt[&Asset::dai()].value(), dec!(1200));

    let outcome = engine.repay(&alice(), &Asset::dai(), dec!(1200)).await.unwrap();
    assert_eq!(outcome.repaid.value(), dec!(1200));
    assert!(outcome.refunded.is_zero());
    assert!(!outcome.position.account.debt.contains_key(&Asset::dai()));
    assert!(outcome.position.account.debt_accrued_at.is_empty());
    assert!(outcome.position.risk.report().unwrap().collateral_ratio.is_infinite());
}

/// Quotes older than 60s block risky operations but not safe ones
#[tokio::test]
async fn test_stale_oracle_blocks_only_risky_operations() {
    let market = Market::new();
    let engine = &market.engine;
    market.open_position(&alice()).await;

    market.clock.advance(Duration::seconds(61));

    let borrow = engine.borrow(&alice(), &Asset::dai(), dec!(10)).await;
    assert!(matches!(borrow, Err(EngineError::StaleOracleData { .. })));
    assert!(borrow.unwrap_err().is_transient());

    let withdraw = engine.withdraw_collateral(&alice(), &Asset::eth(), dec!(0.1)).await;
    assert!(matches!(withdraw, Err(EngineError::StaleOracleData { .. })));

    let repaid = engine.repay(&alice(), &Asset::dai(), dec!(100)).await.unwrap();
    assert!(matches!(repaid.position.risk, RiskView::Unavailable { .. }));

    let deposited = engine
        .deposit_collateral(&alice(), &Asset::eth(), dec!(0.5))
        .await
        .unwrap();
    assert_eq!(deposited.account.collateral[&Asset::eth()].value(), dec!(2.5));
}

#[tokio::test(start_paused = true)]
async fn test_slow_oracle_is_unavailable() {
    let market = Market::new();
    market
        .engine
        .deposit_collateral(&alice(), &Asset::eth(), dec!(2))
        .await
        .unwrap();
    market.oracle.set_delay(Some(std::time::Duration::from_secs(10)));

    let result = market.engine.borrow(&alice(), &Asset::dai(), dec!(100)).await;
    assert!(matches!(result, Err(EngineError::OracleUnavailable { .. })));
}

#[tokio::test]
async fn test_withdrawal_that_would_breach_threshold_rejected() {
    let market = Market::new();
    let engine = &market.engine;
    market.open_position(&alice()).await;

    // leaving 0.8 ETH: 1312 / 1200 = 109%
    let result = engine.withdraw_collateral(&alice(), &Asset::eth(), dec!(1.2)).await;
    assert!(matches!(
        result,
        Err(EngineError::WouldBreachLiquidationThreshold { .. })
    ));

    let position = engine
        .withdraw_collateral(&alice(), &Asset::eth(), dec!(0.6))
        .await
        .unwrap();
    // 1.4 ETH: 2296 / 1200 = 191%
    assert_eq!(position.risk.level(), Some(RiskLevel::Warning));
}

#[tokio::test]
async fn test_interest_accrues_over_a_year() {
    let market = Market::new();
    let engine = &market.engine;
    market.open_position(&alice()).await;
    engine
        .deposit_savings(&carol(), &Asset::dai(), dec!(850))
        .await
        .unwrap();

    market.advance(Duration::days(365), dec!(1640));

    // 1200 × e^0.038 and 850 × e^0.048
    let borrower = engine.snapshot(&alice()).await.unwrap();
    let debt = borrower.account.debt[&Asset::dai()].value();
    assert!(debt > dec!(1246.47) && debt < dec!(1246.48), "{debt}");
    assert_eq!(borrower.account.interest_charged[&Asset::dai()], debt - dec!(1200));

    let saver = engine.snapshot(&carol()).await.unwrap();
    let savings = saver.account.savings[&Asset::dai()].value();
    assert!(savings > dec!(891.79) && savings < dec!(891.80), "{savings}");

    // reading twice at the same instant charges nothing more
    let again = engine.snapshot(&alice()).await.unwrap();
    assert_eq!(again.account.debt[&Asset::dai()].value(), debt);
}

#[tokio::test]
async fn test_ratio_falls_as_debt_grows() {
    let market = Market::new();
    let engine = &market.engine;
    engine
        .deposit_collateral(&alice(), &Asset::eth(), dec!(2))
        .await
        .unwrap();

    let mut previous = engine.risk_report(&alice()).await.unwrap().collateral_ratio;
    assert_eq!(previous, CollateralRatio::Infinite);

    for _ in 0..4 {
        let position = engine.borrow(&alice(), &Asset::dai(), dec!(500)).await.unwrap();
        let ratio = position.risk.report().unwrap().collateral_ratio;
        assert!(ratio < previous);
        previous = ratio;
    }
}

#[tokio::test]
async fn test_savings_round_trip_and_logical_deletion() {
    let market = Market::new();
    let engine = &market.engine;

    engine
        .deposit_savings(&carol(), &Asset::eth(), dec!(1.5))
        .await
        .unwrap();
    let portfolio = engine.portfolio(&carol()).await.unwrap();
    assert_eq!(portfolio.savings_value, dec!(2460));
    assert_eq!(portfolio.net_value, dec!(2460));

    let position = engine
        .withdraw_savings(&carol(), &Asset::eth(), dec!(1.5))
        .await
        .unwrap();
    assert!(position.account.savings.is_empty());
    assert!(!position.account.active);
    assert!(engine.ledger().accounts().await.is_empty());

    let result = engine.withdraw_savings(&carol(), &Asset::eth(), dec!(0.1)).await;
    assert!(matches!(result, Err(EngineError::InsufficientBalance { .. })));
}

#[tokio::test]
async fn test_preview_matches_committed_borrow() {
    let market = Market::new();
    let engine = &market.engine;
    engine
        .deposit_collateral(&alice(), &Asset::eth(), dec!(2))
        .await
        .unwrap();

    let preview = engine
        .preview_borrow(&alice(), &Asset::dai(), dec!(1200))
        .await
        .unwrap();
    let position = engine.borrow(&alice(), &Asset::dai(), dec!(1200)).await.unwrap();

    assert_eq!(
        Some(&preview.collateral_ratio),
        position.risk.report().map(|report| &report.collateral_ratio)
    );
    assert_eq!(preview.monthly_interest, dec!(3.8));
}

#[tokio::test]
async fn test_unapplied_liquidator_credit_can_be_retried() {
    let market = Market::new();
    let engine = &market.engine;
    let start = market.clock.now();

    // a day of interest pushes this balance past MAX_AMOUNT, so carol's
    // account refuses every mutation until the clock is back at `start`
    engine
        .deposit_savings(&carol(), &Asset::dai(), MAX_AMOUNT)
        .await
        .unwrap();
    market.advance(Duration::days(1), dec!(1640));
    market.open_position(&alice()).await;

    market.set_price(Asset::eth(), dec!(720));
    let outcome = engine.liquidate(&alice(), &carol()).await.unwrap();
    let LiquidatorCredit::Pending { credit_id } = outcome.credit else {
        panic!("expected a pending credit, got {:?}", outcome.credit);
    };

    // the borrower side committed regardless
    assert_eq!(outcome.borrower.account.debt[&Asset::dai()].value(), dec!(600));
    assert_eq!(engine.pending_credits().len(), 1);

    let retry = engine.retry_liquidator_credit(credit_id).await;
    assert!(matches!(retry, Err(EngineError::InvariantViolation(_))));
    assert_eq!(engine.pending_credits().len(), 1);

    market.clock.set(start);
    let credited = engine.retry_liquidator_credit(credit_id).await.unwrap();
    assert_eq!(credited.account.collateral[&Asset::eth()].value(), dec!(0.875));
    assert!(engine.pending_credits().is_empty());
}

/// Amounts past MAX_AMOUNT are refused before anything is committed
#[tokio::test]
async fn test_oversized_balances_rejected_without_side_effects() {
    let market = Market::new();
    let engine = &market.engine;
    let huge = Decimal::from_i128_with_scale(10i128.pow(26), 0);

    let result = engine.deposit_collateral(&alice(), &Asset::eth(), huge).await;
    assert!(matches!(result, Err(EngineError::InvalidAmount { value }) if value == huge));
    assert!(engine.ledger().accounts().await.is_empty());

    // the largest legal deposit is valued at the largest legal price
    market.set_price(Asset::eth(), MAX_PRICE);
    let position = engine
        .deposit_collateral(&alice(), &Asset::eth(), MAX_AMOUNT)
        .await
        .unwrap();
    assert!(matches!(position.risk, RiskView::Evaluated(_)));

    let result = engine.deposit_collateral(&alice(), &Asset::eth(), Decimal::ONE).await;
    assert!(matches!(result, Err(EngineError::BalanceLimitExceeded { limit, .. }) if limit == MAX_AMOUNT));

    let max = engine.max_borrowable(&alice(), &Asset::dai()).await.unwrap();
    assert_eq!(max, MAX_AMOUNT);
    let report = engine.risk_report(&alice()).await.unwrap();
    assert_eq!(report.collateral_value, MAX_AMOUNT * MAX_PRICE);

    // a quote past MAX_PRICE fails closed instead of overflowing
    market.set_price(Asset::eth(), MAX_PRICE * dec!(10));
    let result = engine.risk_report(&alice()).await;
    assert!(matches!(result, Err(EngineError::OracleUnavailable { .. })));
}

/// Reads of unknown accounts leave the ledger as they found it
#[tokio::test]
async fn test_reads_do_not_create_accounts() {
    let market = Market::new();
    let engine = &market.engine;

    for n in 0..100 {
        let ghost = AccountId::from(format!("ghost-{n}"));
        engine.snapshot(&ghost).await.unwrap();
        engine.risk_report(&ghost).await.unwrap();
        engine.portfolio(&ghost).await.unwrap();
        engine.max_borrowable(&ghost, &Asset::dai()).await.unwrap();
        engine.preview_borrow(&ghost, &Asset::dai(), dec!(1)).await.ok();
    }
    assert_eq!(engine.ledger().record_count(), 0);

    market.open_position(&alice()).await;
    engine.snapshot(&alice()).await.unwrap();
    assert_eq!(engine.ledger().record_count(), 1);
}

/// A capped seizure can strip all collateral; the leftover debt is reported
/// as having nothing to seize
#[tokio::test]
async fn test_liquidation_of_debt_without_collateral() {
    let market = Market::new();
    let engine = &market.engine;
    market.open_position(&alice()).await;

    // 2 ETH × 300 = 600 of collateral against 1200 DAI
    market.set_price(Asset::eth(), dec!(300));
    let outcome = engine.liquidate(&alice(), &carol()).await.unwrap();
    assert!(outcome.plan.capped);
    assert!(outcome.borrower.account.collateral.is_empty());
    assert!(outcome.borrower.account.has_debt());

    let report = engine.risk_report(&alice()).await.unwrap();
    assert_eq!(report.level, RiskLevel::Liquidatable);

    let result = engine.liquidate(&alice(), &carol()).await;
    assert!(matches!(result, Err(EngineError::NothingToSeize { account }) if account == alice()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_are_serialized() {
    let market = Market::new();
    let mut handles = Vec::new();

    for _ in 0..25 {
        let engine = market.engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .deposit_collateral(&alice(), &Asset::eth(), dec!(0.1))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let position = market.engine.snapshot(&alice()).await.unwrap();
    assert_eq!(position.account.collateral[&Asset::eth()].value(), dec!(2.5));
}

#[tokio::test]
async fn test_every_commit_is_journaled() {
    let clock = Arc::new(ManualClock::default());
    let oracle = Arc::new(MockOracle::new());
    oracle.set_price_at(Asset::eth(), dec!(1640), clock.now());
    oracle.set_price_at(Asset::dai(), Decimal::ONE, clock.now());
    let (ledger, journal) = LedgerStore::in_memory();
    let engine = LendingEngine::new(Arc::new(MarketConfig::demo()), ledger, oracle, clock.clone());

    engine
        .deposit_collateral(&alice(), &Asset::eth(), dec!(2))
        .await
        .unwrap();
    engine.borrow(&alice(), &Asset::dai(), dec!(1200)).await.unwrap();
    let _ = engine.borrow(&alice(), &Asset::dai(), dec!(5000)).await;

    clock.advance(Duration::days(30));
    engine.repay(&alice(), &Asset::dai(), dec!(100)).await.unwrap();

    let kinds: Vec<_> = journal
        .events_for(&alice())
        .into_iter()
        .map(|event| event.kind)
        .collect();
    assert_eq!(kinds.len(), 4);
    assert!(matches!(kinds[2], LedgerEventKind::InterestAccrued { .. }));
    assert!(matches!(kinds[3], LedgerEventKind::Delta { .. }));
}
