//! Ledger errors

use lendbook_core::{AccountId, Asset};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::balance::BalanceKind;

/// Errors that can occur in ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient {kind} balance of {asset} for {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        account: AccountId,
        kind: BalanceKind,
        asset: Asset,
        available: Decimal,
        requested: Decimal,
    },

    #[error("{kind} balance of {asset} for {account} would reach {requested}, above the limit {limit}")]
    BalanceLimitExceeded {
        account: AccountId,
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

    /// A logic defect: the mutation is refused and must be alerted on.
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),
}
