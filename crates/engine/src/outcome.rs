//! Values returned by position operations

use chrono::{DateTime, Utc};
use lendbook_core::{AccountId, Amount, Asset, CollateralRatio};
use lendbook_ledger::AccountSnapshot;
use lendbook_risk::{LiquidationPlan, RiskLevel, RiskReport};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Risk figures attached to a position, if prices could be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RiskView {
    Evaluated(RiskReport),
    /// Operations that cannot worsen risk still commit without prices
    Unavailable { reason: String },
}

impl RiskView {
    pub fn report(&self) -> Option<&RiskReport> {
        match self {
            RiskView::Evaluated(report) => Some(report),
            RiskView::Unavailable { .. } => None,
        }
    }

    pub fn level(&self) -> Option<RiskLevel> {
        self.report().map(|report| report.level)
    }
}

/// Balances and post-operation risk of one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub account: AccountSnapshot,
    pub risk: RiskView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepayOutcome {
    pub position: PositionSnapshot,
    pub repaid: Amount,
    /// Excess returned to the payer under the refund policy
    pub refunded: Amount,
}

/// Whether the liquidator's collateral credit has landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LiquidatorCredit {
    Applied,
    /// Borrower side committed, credit waiting for `retry_liquidator_credit`
    Pending { credit_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    pub borrower: PositionSnapshot,
    pub liquidator: AccountId,
    pub plan: LiquidationPlan,
    pub credit: LiquidatorCredit,
}

/// Collateral owed to a liquidator whose credit could not be applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCredit {
    pub id: Uuid,
    pub liquidator: AccountId,
    pub borrower: AccountId,
    pub asset: Asset,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// What a borrow would look like, without committing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowPreview {
    pub asset: Asset,
    pub amount: Amount,
    pub max_borrowable: Decimal,
    pub collateral_ratio: CollateralRatio,
    pub level: RiskLevel,
    /// `amount × APR / 12`
    pub monthly_interest: Decimal,
    /// The borrow would pass every check
    pub allowed: bool,
}

/// One entry of the liquidation scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRisk {
    pub account: AccountId,
    pub report: RiskReport,
}
