//! Risk engine errors

use chrono::{DateTime, Utc};
use lendbook_core::{AccountId, Asset, CollateralRatio};
use lendbook_ledger::LedgerError;
use lendbook_oracle::OracleError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RiskError {
    #[error("Asset is not configured: {0}")]
    UnknownAsset(Asset),

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

    #[error("Arithmetic overflow computing {0}")]
    Overflow(&'static str),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<OracleError> for RiskError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::StalePrice {
                asset,
                as_of,
                max_age_secs,
            } => RiskError::StaleOracleData {
                asset,
                as_of,
                max_age_secs,
            },
            other => RiskError::OracleUnavailable {
                reason: other.to_string(),
            },
        }
    }
}

/// Errors loading or validating `MarketConfig`
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: String, value: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}
