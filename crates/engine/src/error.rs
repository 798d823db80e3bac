//! Position operation errors

use chrono::{DateTime, Utc};
use lendbook_core::{AccountId, AmountError, Asset, CollateralRatio};
use lendbook_ledger::{BalanceKind, LedgerError};
use lendbook_risk::RiskError;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Every way a position operation can be refused
///
/// A returned error means the operation had no effect on any balance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid amount: {value}")]
    InvalidAmount { value: Decimal },

    #[error("Asset is not configured: {0}")]
    UnknownAsset(Asset),

    #[error("Insufficient {kind} balance of {asset}: available {available}, requested {requested}")]
    InsufficientBalance {
        kind: BalanceKind,
        asset: Asset,
        available: Decimal,
        requested: Decimal,
    },

    #[error("{kind} balance of {asset} would reach {requested}, above the limit {limit}")]
    BalanceLimitExceeded {
        kind: BalanceKind,
        asset: Asset,
        limit: Decimal,
        requested: Decimal,
    },

    #[error("Insufficient {asset} liquidity: available {available}, requested {requested}")]
    InsufficientLiquidity {
        asset: Asset,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Borrow of {requested} {asset} exceeds limit {max_borrowable}")]
    ExceedsBorrowLimit {
        asset: Asset,
        requested: Decimal,
        max_borrowable: Decimal,
    },

    #[error("Operation would leave ratio {ratio} at or below liquidation threshold {threshold}%")]
    WouldBreachLiquidationThreshold {
        ratio: CollateralRatio,
        threshold: Decimal,
    },

    #[error("Stale oracle data for {asset}: quoted at {as_of}, max age {max_age_secs}s")]
    StaleOracleData {
        asset: Asset,
        as_of: DateTime<Utc>,
        max_age_secs: u64,
    },

    #[error("Oracle unavailable: {reason}")]
    OracleUnavailable { reason: String },

    #[error("Position not liquidatable: ratio {ratio} above threshold {threshold}%")]
    PositionNotLiquidatable {
        ratio: CollateralRatio,
        threshold: Decimal,
    },

    #[error("Position of {account} has debt but no collateral to seize")]
    NothingToSeize { account: AccountId },

    #[error("Repayment of {requested} {asset} exceeds outstanding debt {outstanding}")]
    OverRepayment {
        asset: Asset,
        outstanding: Decimal,
        requested: Decimal,
    },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("No pending liquidator credit {0}")]
    UnknownCredit(Uuid),
}

impl EngineError {
    /// Oracle failures may succeed when retried; everything else will not
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::StaleOracleData { .. } | EngineError::OracleUnavailable { .. }
        )
    }
}

impl From<AmountError> for EngineError {
    fn from(err: AmountError) -> Self {
        match err {
            AmountError::NegativeAmount(value)
            | AmountError::NotPositive(value)
            | AmountError::TooLarge(value) => EngineError::InvalidAmount { value },
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance {
                kind,
                asset,
                available,
                requested,
                ..
            } => EngineError::InsufficientBalance {
                kind,
                asset,
                available,
                requested,
            },
            LedgerError::BalanceLimitExceeded {
                kind,
                asset,
                limit,
                requested,
                ..
            } => EngineError::BalanceLimitExceeded {
                kind,
                asset,
                limit,
                requested,
            },
            LedgerError::InsufficientLiquidity {
                asset,
                available,
                requested,
            } => EngineError::InsufficientLiquidity {
                asset,
                available,
                requested,
            },
            LedgerError::InvariantViolation(message) => EngineError::InvariantViolation(message),
        }
    }
}

impl From<RiskError> for EngineError {
    fn from(err: RiskError) -> Self {
        match err {
            RiskError::UnknownAsset(asset) => EngineError::UnknownAsset(asset),
            RiskError::StaleOracleData {
                asset,
                as_of,
                max_age_secs,
            } => EngineError::StaleOracleData {
                asset,
                as_of,
                max_age_secs,
            },
            RiskError::OracleUnavailable { reason } => EngineError::OracleUnavailable { reason },
            RiskError::PositionNotLiquidatable { ratio, threshold } => {
                EngineError::PositionNotLiquidatable { ratio, threshold }
            }
            RiskError::NothingToSeize { account } => EngineError::NothingToSeize { account },
            RiskError::Overflow(what) => {
                EngineError::InvariantViolation(format!("arithmetic overflow computing {what}"))
            }
            RiskError::Ledger(err) => err.into(),
        }
    }
}
