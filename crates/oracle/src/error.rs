//! Oracle error types

use chrono::{DateTime, Utc};
use lendbook_core::Asset;
use thiserror::Error;

/// Oracle-related errors
#[derive(Debug, Error)]
pub enum OracleError {
    /// No feed for this asset
    #[error("No price feed for asset: {asset}")]
    AssetNotFound { asset: Asset },

    /// Price data is older than the configured bound
    #[error("Stale price for {asset}: quoted at {as_of}, max age is {max_age_secs}s")]
    StalePrice {
        asset: Asset,
        as_of: DateTime<Utc>,
        max_age_secs: u64,
    },

    /// Price data is invalid
    #[error("Invalid price for {asset}: {reason}")]
    InvalidPrice { asset: Asset, reason: String },

    /// The feed did not answer in time
    #[error("Oracle timed out after {timeout_ms}ms reading {asset}")]
    Timeout { asset: Asset, timeout_ms: u64 },

    /// External oracle connection failed
    #[error("Oracle connection failed: {source}")]
    ConnectionFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl OracleError {
    /// Stale data is distinguished from an unreachable feed
    pub fn is_stale(&self) -> bool {
        matches!(self, OracleError::StalePrice { .. })
    }
}
