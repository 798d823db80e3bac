//! Lending engine - Position Operations API
//!
//! Every mutating operation follows the same flow under the account's lock:
//!
//! 1. Accrue interest on all debt and savings balances up to `now`
//! 2. Validate the request (amount, asset, balances, risk)
//! 3. Apply one atomic ledger delta
//! 4. Return the new balances with their post-operation risk
//!
//! Operations that can worsen a position (borrow, collateral withdrawal,
//! liquidation) require fresh prices and fail closed without them. The others
//! commit without the oracle and report `RiskView::Unavailable` instead.

use chrono::{DateTime, Utc};
use lendbook_core::{AccountId, Amount, Asset};
use lendbook_ledger::{AccountGuard, AccountSnapshot, BalanceDelta, BalanceKind, LedgerStore};
use lendbook_oracle::PriceOracle;
use lendbook_risk::{
    InterestAccrual, LiquidationPlanner, MarketConfig, OverRepaymentPolicy, PortfolioSummary,
    Prices, RiskEngine, RiskLevel, RiskReport,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::EngineError;
use crate::outcome::{
    AccountRisk, BorrowPreview, LiquidationOutcome, LiquidatorCredit, PendingCredit,
    PositionSnapshot, RepayOutcome, RiskView,
};

fn logged<T>(
    operation: &'static str,
    account: &AccountId,
    result: Result<T, EngineError>,
) -> Result<T, EngineError> {
    if let Err(err) = &result {
        if matches!(err, EngineError::InvariantViolation(_)) {
            tracing::error!(operation, account = %account, error = %err, "operation refused");
        } else {
            tracing::warn!(operation, account = %account, error = %err, "operation rejected");
        }
    }
    result
}

/// Lending engine
pub struct LendingEngine {
    config: Arc<MarketConfig>,
    ledger: LedgerStore,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
    risk: RiskEngine,
    accrual: InterestAccrual,
    liquidation: LiquidationPlanner,
    pending: Mutex<HashMap<Uuid, PendingCredit>>,
}

impl LendingEngine {
    /// Wire the engine and seed pool cash from `initial_liquidity`
    pub fn new(
        config: Arc<MarketConfig>,
        ledger: LedgerStore,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        for (asset, cfg) in &config.assets {
            if let Ok(amount) = Amount::positive(cfg.initial_liquidity) {
                ledger.pool().supply(asset, amount);
            }
        }

        Self {
            risk: RiskEngine::new(config.clone()),
            accrual: InterestAccrual::new(config.clone()),
            liquidation: LiquidationPlanner::new(config.clone()),
            config,
            ledger,
            oracle,
            clock,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Engine over a fresh in-memory ledger
    pub fn in_memory(
        config: MarketConfig,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(Arc::new(config), LedgerStore::default(), oracle, clock)
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Lock the account and bring its interest-bearing balances current
    async fn open(&self, account: &AccountId, now: DateTime<Utc>) -> Result<AccountGuard, EngineError> {
        let mut guard = self.ledger.lock(account).await;
        self.accrual.accrue_all(&mut guard, now)?;
        Ok(guard)
    }

    /// Current balances, accrued to `now`
    async fn current(&self, account: &AccountId, now: DateTime<Utc>) -> Result<AccountSnapshot, EngineError> {
        Ok(self.open(account, now).await?.snapshot())
    }

    async fn prices_for(
        &self,
        snapshot: &AccountSnapshot,
        extra: &[&Asset],
        now: DateTime<Utc>,
    ) -> Result<Prices, EngineError> {
        let mut assets = RiskEngine::priced_assets(snapshot);
        assets.extend(extra.iter().map(|asset| (*asset).clone()));
        Ok(self
            .risk
            .fetch_prices(self.oracle.as_ref(), assets.iter(), now)
            .await?)
    }

    async fn evaluate(&self, snapshot: &AccountSnapshot, now: DateTime<Utc>) -> Result<RiskReport, EngineError> {
        let prices = self.prices_for(snapshot, &[], now).await?;
        Ok(self.risk.report(snapshot, &prices)?)
    }

    /// Best-effort risk for operations that do not need prices to commit
    async fn view(&self, account: AccountSnapshot, now: DateTime<Utc>) -> PositionSnapshot {
        let risk = match self.evaluate(&account, now).await {
            Ok(report) => RiskView::Evaluated(report),
            Err(err) => {
                tracing::debug!(account = %account.account, error = %err, "risk view unavailable");
                RiskView::Unavailable {
                    reason: err.to_string(),
                }
            }
        };
        PositionSnapshot { account, risk }
    }

    fn ensure_not_liquidatable(report: &RiskReport) -> Result<(), EngineError> {
        if report.level == RiskLevel::Liquidatable {
            return Err(EngineError::WouldBreachLiquidationThreshold {
                ratio: report.collateral_ratio,
                threshold: report.liquidation_threshold,
            });
        }
        Ok(())
    }

    fn pending_credits_lock(&self) -> MutexGuard<'_, HashMap<Uuid, PendingCredit>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // === Collateral ===

    /// Pledge collateral; never needs the oracle
    pub async fn deposit_collateral(
        &self,
        account: &AccountId,
        asset: &Asset,
        amount: Decimal,
    ) -> Result<PositionSnapshot, EngineError> {
        let now = self.clock.now();
        logged(
            "deposit_collateral",
            account,
            self.try_deposit_collateral(account, asset, amount, now).await,
        )
    }

    async fn try_deposit_collateral(
        &self,
        account: &AccountId,
        asset: &Asset,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PositionSnapshot, EngineError> {
        let amount = Amount::positive(amount)?;
        self.config.asset(asset)?;

        let snapshot = {
            let mut guard = self.open(account, now).await?;
            let delta = BalanceDelta::new().credit(BalanceKind::Collateral, asset.clone(), amount);
            guard.apply_delta(&delta, now)?
        };

        tracing::info!(account = %account, asset = %asset, amount = %amount, "collateral deposited");
        Ok(self.view(snapshot, now).await)
    }

    /// Release collateral, refusing any withdrawal that leaves debt liquidatable
    pub async fn withdraw_collateral(
        &self,
        account: &AccountId,
        asset: &Asset,
        amount: Decimal,
    ) -> Result<PositionSnapshot, EngineError> {
        let now = self.clock.now();
        logged(
            "withdraw_collateral",
            account,
            self.try_withdraw_collateral(account, asset, amount, now).await,
        )
    }

    async fn try_withdraw_collateral(
        &self,
        account: &AccountId,
        asset: &Asset,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PositionSnapshot, EngineError> {
        let amount = Amount::positive(amount)?;
        self.config.asset(asset)?;

        let mut guard = self.open(account, now).await?;
        let delta = BalanceDelta::new().debit(BalanceKind::Collateral, asset.clone(), amount);
        let projected = guard.project(&delta)?;

        // Without debt the ratio stays infinite, so no prices are needed
        let report = if projected.has_debt() {
            let report = self.evaluate(&projected, now).await?;
            Self::ensure_not_liquidatable(&report)?;
            Some(report)
        } else {
            None
        };

        let snapshot = guard.apply_delta(&delta, now)?;
        drop(guard);

        tracing::info!(account = %account, asset = %asset, amount = %amount, "collateral withdrawn");
        Ok(match report {
            Some(report) => PositionSnapshot {
                account: snapshot,
                risk: RiskView::Evaluated(report),
            },
            None => self.view(snapshot, now).await,
        })
    }

    // === Debt ===

    /// Borrow against collateral, up to `max_borrowable`
    pub async fn borrow(
        &self,
        account: &AccountId,
        asset: &Asset,
        amount: Decimal,
    ) -> Result<PositionSnapshot, EngineError> {
        let now = self.clock.now();
        logged("borrow", account, self.try_borrow(account, asset, amount, now).await)
    }

    async fn try_borrow(
        &self,
        account: &AccountId,
        asset: &Asset,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PositionSnapshot, EngineError> {
        let amount = Amount::positive(amount)?;
        self.config.asset(asset)?;

        let mut guard = self.open(account, now).await?;
        let current = guard.snapshot();
        let prices = self.prices_for(&current, &[asset], now).await?;

        let max_borrowable = self.risk.max_borrowable(&current, &prices, asset)?;
        if amount.value() > max_borrowable {
            return Err(EngineError::ExceedsBorrowLimit {
                asset: asset.clone(),
                requested: amount.value(),
                max_borrowable,
            });
        }

        let delta = BalanceDelta::new().credit(BalanceKind::Debt, asset.clone(), amount);
        let report = self.risk.report(&guard.project(&delta)?, &prices)?;
        Self::ensure_not_liquidatable(&report)?;

        let snapshot = guard.apply_delta(&delta, now)?;
        self.ledger.pool().draw(asset, amount);
        drop(guard);

        tracing::info!(
            account = %account,
            asset = %asset,
            amount = %amount,
            ratio = %report.collateral_ratio,
            "borrowed"
        );
        Ok(PositionSnapshot {
            account: snapshot,
            risk: RiskView::Evaluated(report),
        })
    }

    /// Repay debt; the excess over outstanding debt follows `over_repayment`
    pub async fn repay(
        &self,
        account: &AccountId,
        asset: &Asset,
        amount: Decimal,
    ) -> Result<RepayOutcome, EngineError> {
        let now = self.clock.now();
        logged("repay", account, self.try_repay(account, asset, amount, now).await)
    }

    async fn try_repay(
        &self,
        account: &AccountId,
        asset: &Asset,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<RepayOutcome, EngineError> {
        let requested = Amount::positive(amount)?;
        self.config.asset(asset)?;

        let mut guard = self.open(account, now).await?;
        let outstanding = guard.state().balance(BalanceKind::Debt, asset);
        let excess = requested.value() - outstanding;

        let (repaid, refunded) = if excess <= Decimal::ZERO {
            (requested, Amount::ZERO)
        } else {
            match self.config.over_repayment {
                OverRepaymentPolicy::Reject => {
                    return Err(EngineError::OverRepayment {
                        asset: asset.clone(),
                        outstanding,
                        requested: requested.value(),
                    });
                }
                OverRepaymentPolicy::Refund => (
                    Amount::new_unchecked(outstanding),
                    Amount::new_unchecked(excess),
                ),
            }
        };

        let snapshot = if repaid.is_zero() {
            guard.snapshot()
        } else {
            let delta = BalanceDelta::new().debit(BalanceKind::Debt, asset.clone(), repaid);
            let snapshot = guard.apply_delta(&delta, now)?;
            self.ledger.pool().supply(asset, repaid);
            snapshot
        };
        drop(guard);

        tracing::info!(
            account = %account,
            asset = %asset,
            amount = %repaid,
            refunded = %refunded,
            "debt repaid"
        );
        Ok(RepayOutcome {
            position: self.view(snapshot, now).await,
            repaid,
            refunded,
        })
    }

    // === Savings ===

    /// Deposit into savings; the funds join pool cash
    pub async fn deposit_savings(
        &self,
        account: &AccountId,
        asset: &Asset,
        amount: Decimal,
    ) -> Result<PositionSnapshot, EngineError> {
        let now = self.clock.now();
        logged(
            "deposit_savings",
            account,
            self.try_deposit_savings(account, asset, amount, now).await,
        )
    }

    async fn try_deposit_savings(
        &self,
        account: &AccountId,
        asset: &Asset,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PositionSnapshot, EngineError> {
        let amount = Amount::positive(amount)?;
        self.config.asset(asset)?;

        let snapshot = {
            let mut guard = self.open(account, now).await?;
            let delta = BalanceDelta::new().credit(BalanceKind::Savings, asset.clone(), amount);
            let snapshot = guard.apply_delta(&delta, now)?;
            self.ledger.pool().supply(asset, amount);
            snapshot
        };

        tracing::info!(account = %account, asset = %asset, amount = %amount, "savings deposited");
        Ok(self.view(snapshot, now).await)
    }

    /// Withdraw savings, bounded by the balance and by pool cash
    pub async fn withdraw_savings(
        &self,
        account: &AccountId,
        asset: &Asset,
        amount: Decimal,
    ) -> Result<PositionSnapshot, EngineError> {
        let now = self.clock.now();
        logged(
            "withdraw_savings",
            account,
            self.try_withdraw_savings(account, asset, amount, now).await,
        )
    }

    async fn try_withdraw_savings(
        &self,
        account: &AccountId,
        asset: &Asset,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PositionSnapshot, EngineError> {
        let amount = Amount::positive(amount)?;
        self.config.asset(asset)?;

        let snapshot = {
            let mut guard = self.open(account, now).await?;
            let delta = BalanceDelta::new().debit(BalanceKind::Savings, asset.clone(), amount);
            guard.project(&delta)?;

            self.ledger.pool().withdraw(asset, amount)?;
            match guard.apply_delta(&delta, now) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    self.ledger.pool().supply(asset, amount);
                    return Err(err.into());
                }
            }
        };

        tracing::info!(account = %account, asset = %asset, amount = %amount, "savings withdrawn");
        Ok(self.view(snapshot, now).await)
    }

    // === Liquidation ===

    /// Liquidate the largest debt against the largest collateral
    pub async fn liquidate(
        &self,
        account: &AccountId,
        liquidator: &AccountId,
    ) -> Result<LiquidationOutcome, EngineError> {
        let now = self.clock.now();
        logged(
            "liquidate",
            account,
            self.try_liquidate(account, liquidator, None, now).await,
        )
    }

    /// Liquidate a chosen debt asset against a chosen collateral asset
    pub async fn liquidate_pair(
        &self,
        account: &AccountId,
        liquidator: &AccountId,
        debt_asset: &Asset,
        collateral_asset: &Asset,
    ) -> Result<LiquidationOutcome, EngineError> {
        let now = self.clock.now();
        logged(
            "liquidate",
            account,
            self.try_liquidate(account, liquidator, Some((debt_asset, collateral_asset)), now)
                .await,
        )
    }

    async fn try_liquidate(
        &self,
        account: &AccountId,
        liquidator: &AccountId,
        pair: Option<(&Asset, &Asset)>,
        now: DateTime<Utc>,
    ) -> Result<LiquidationOutcome, EngineError> {
        if let Some((debt_asset, collateral_asset)) = pair {
            self.config.asset(debt_asset)?;
            self.config.asset(collateral_asset)?;
        }

        let mut guard = self.open(account, now).await?;
        let current = guard.snapshot();
        let prices = self.prices_for(&current, &[], now).await?;
        let report = self.risk.report(&current, &prices)?;
        RiskEngine::ensure_liquidatable(&report)?;

        let (debt_asset, collateral_asset) = match pair {
            Some((debt_asset, collateral_asset)) => (debt_asset.clone(), collateral_asset.clone()),
            None => self.liquidation.select_pair(&current, &prices, &report)?,
        };
        let plan = self
            .liquidation
            .plan(&current, &prices, &report, &debt_asset, &collateral_asset)?;

        let delta = BalanceDelta::new()
            .debit(BalanceKind::Debt, plan.debt_asset.clone(), plan.debt_repaid)
            .debit(BalanceKind::Collateral, plan.collateral_asset.clone(), plan.collateral_seized);
        let snapshot = guard.apply_delta(&delta, now)?;
        self.ledger.pool().supply(&plan.debt_asset, plan.debt_repaid);
        drop(guard);

        tracing::info!(
            account = %account,
            liquidator = %liquidator,
            debt_asset = %plan.debt_asset,
            debt_repaid = %plan.debt_repaid,
            collateral_asset = %plan.collateral_asset,
            collateral_seized = %plan.collateral_seized,
            capped = plan.capped,
            "position liquidated"
        );

        let risk = match self.risk.report(&snapshot, &prices) {
            Ok(report) => RiskView::Evaluated(report),
            Err(err) => RiskView::Unavailable {
                reason: err.to_string(),
            },
        };

        // The borrower side is committed; the credit is a separate delta
        let credit = self
            .credit_liquidator(PendingCredit {
                id: Uuid::new_v4(),
                liquidator: liquidator.clone(),
                borrower: account.clone(),
                asset: plan.collateral_asset.clone(),
                amount: plan.collateral_seized,
                created_at: now,
            })
            .await;

        Ok(LiquidationOutcome {
            borrower: PositionSnapshot {
                account: snapshot,
                risk,
            },
            liquidator: liquidator.clone(),
            plan,
            credit,
        })
    }

    async fn apply_credit(&self, credit: &PendingCredit) -> Result<AccountSnapshot, EngineError> {
        let now = self.clock.now();
        let mut guard = self.open(&credit.liquidator, now).await?;
        let delta = BalanceDelta::new().credit(BalanceKind::Collateral, credit.asset.clone(), credit.amount);
        Ok(guard.apply_delta(&delta, now)?)
    }

    async fn credit_liquidator(&self, credit: PendingCredit) -> LiquidatorCredit {
        match self.apply_credit(&credit).await {
            Ok(_) => LiquidatorCredit::Applied,
            Err(err) => {
                tracing::error!(
                    credit_id = %credit.id,
                    liquidator = %credit.liquidator,
                    borrower = %credit.borrower,
                    asset = %credit.asset,
                    amount = %credit.amount,
                    error = %err,
                    "liquidator credit failed, kept as pending"
                );
                let credit_id = credit.id;
                self.pending_credits_lock().insert(credit_id, credit);
                LiquidatorCredit::Pending { credit_id }
            }
        }
    }

    /// Re-apply a liquidator credit that failed after its liquidation committed
    pub async fn retry_liquidator_credit(&self, credit_id: Uuid) -> Result<PositionSnapshot, EngineError> {
        let credit = self
            .pending_credits_lock()
            .remove(&credit_id)
            .ok_or(EngineError::UnknownCredit(credit_id))?;

        match self.apply_credit(&credit).await {
            Ok(snapshot) => {
                tracing::info!(
                    credit_id = %credit_id,
                    liquidator = %credit.liquidator,
                    amount = %credit.amount,
                    "pending liquidator credit applied"
                );
                Ok(self.view(snapshot, self.clock.now()).await)
            }
            Err(err) => {
                tracing::error!(credit_id = %credit_id, error = %err, "pending liquidator credit failed again");
                self.pending_credits_lock().insert(credit_id, credit);
                Err(err)
            }
        }
    }

    /// Credits waiting for `retry_liquidator_credit`, oldest first
    pub fn pending_credits(&self) -> Vec<PendingCredit> {
        let mut credits: Vec<PendingCredit> = self.pending_credits_lock().values().cloned().collect();
        credits.sort_by_key(|credit| credit.created_at);
        credits
    }

    // === Reads ===

    /// Balances accrued to now, with risk when prices are available
    pub async fn snapshot(&self, account: &AccountId) -> Result<PositionSnapshot, EngineError> {
        let now = self.clock.now();
        let snapshot = self.current(account, now).await?;
        Ok(self.view(snapshot, now).await)
    }

    /// Risk figures, failing closed on oracle errors
    pub async fn risk_report(&self, account: &AccountId) -> Result<RiskReport, EngineError> {
        let now = self.clock.now();
        let snapshot = self.current(account, now).await?;
        self.evaluate(&snapshot, now).await
    }

    pub async fn max_borrowable(&self, account: &AccountId, asset: &Asset) -> Result<Decimal, EngineError> {
        self.config.asset(asset)?;
        let now = self.clock.now();
        let snapshot = self.current(account, now).await?;
        let prices = self.prices_for(&snapshot, &[asset], now).await?;
        Ok(self.risk.max_borrowable(&snapshot, &prices, asset)?)
    }

    /// Dashboard totals across collateral, savings and debt
    pub async fn portfolio(&self, account: &AccountId) -> Result<PortfolioSummary, EngineError> {
        let now = self.clock.now();
        let snapshot = self.current(account, now).await?;
        let savings: Vec<&Asset> = snapshot.savings.keys().collect();
        let prices = self.prices_for(&snapshot, &savings, now).await?;
        Ok(self.risk.portfolio(&snapshot, &prices)?)
    }

    /// Scan every active account with debt and return the liquidatable ones
    pub async fn liquidatable_accounts(&self) -> Result<Vec<AccountRisk>, EngineError> {
        let now = self.clock.now();
        let mut candidates = Vec::new();

        for account in self.ledger.accounts().await {
            let snapshot = self.current(&account, now).await?;
            if !snapshot.has_debt() {
                continue;
            }
            let report = self.evaluate(&snapshot, now).await?;
            if report.level == RiskLevel::Liquidatable {
                candidates.push(AccountRisk { account, report });
            }
        }

        tracing::debug!(count = candidates.len(), "liquidation scan finished");
        Ok(candidates)
    }

    /// Bring one balance current at an explicit `now` and return it
    pub async fn accrue(
        &self,
        account: &AccountId,
        asset: &Asset,
        kind: BalanceKind,
        now: DateTime<Utc>,
    ) -> Result<Decimal, EngineError> {
        self.config.asset(asset)?;
        let mut guard = self.ledger.lock(account).await;
        Ok(self.accrual.accrue(&mut guard, asset, kind, now)?)
    }

    /// Post-borrow ratio and monthly interest, nothing committed
    pub async fn preview_borrow(
        &self,
        account: &AccountId,
        asset: &Asset,
        amount: Decimal,
    ) -> Result<BorrowPreview, EngineError> {
        let amount = Amount::positive(amount)?;
        let borrow_apr = self.config.asset(asset)?.borrow_apr;
        let now = self.clock.now();

        let (current, projected) = {
            let guard = self.open(account, now).await?;
            let delta = BalanceDelta::new().credit(BalanceKind::Debt, asset.clone(), amount);
            (guard.snapshot(), guard.project(&delta)?)
        };

        let prices = self.prices_for(&current, &[asset], now).await?;
        let max_borrowable = self.risk.max_borrowable(&current, &prices, asset)?;
        let report = self.risk.report(&projected, &prices)?;

        Ok(BorrowPreview {
            asset: asset.clone(),
            amount,
            max_borrowable,
            collateral_ratio: report.collateral_ratio,
            level: report.level,
            monthly_interest: InterestAccrual::monthly_interest(amount.value(), borrow_apr),
            allowed: amount.value() <= max_borrowable && report.level != RiskLevel::Liquidatable,
        })
    }
}
