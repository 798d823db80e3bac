//! Freshness policy for oracle reads
//!
//! Fail closed: a read that times out, returns a price outside
//! `(0, MAX_PRICE]` or a quote older than `max_age_secs` is an error, never a
//! fallback value.

use chrono::{DateTime, Utc};
use lendbook_core::{Asset, MAX_PRICE};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::OracleError;
use crate::types::{PriceOracle, PriceQuote};

/// Default maximum quote age
pub const DEFAULT_MAX_AGE_SECS: u64 = 60;

/// Default time allowed for one oracle read
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OraclePolicy {
    pub max_age_secs: u64,
    pub timeout: Duration,
}

impl Default for OraclePolicy {
    fn default() -> Self {
        Self {
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl OraclePolicy {
    pub fn new(max_age_secs: u64, timeout: Duration) -> Self {
        Self {
            max_age_secs,
            timeout,
        }
    }

    /// Read one quote and check that it is usable at `now`
    pub async fn fetch(
        &self,
        oracle: &dyn PriceOracle,
        asset: &Asset,
        now: DateTime<Utc>,
    ) -> Result<PriceQuote, OracleError> {
        let quote = tokio::time::timeout(self.timeout, oracle.get_price(asset))
            .await
            .map_err(|_| OracleError::Timeout {
                asset: asset.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        if quote.price <= Decimal::ZERO {
            return Err(OracleError::InvalidPrice {
                asset: asset.clone(),
                reason: format!("non-positive price {}", quote.price),
            });
        }
        if quote.price > MAX_PRICE {
            return Err(OracleError::InvalidPrice {
                asset: asset.clone(),
                reason: format!("price {} above the limit {MAX_PRICE}", quote.price),
            });
        }

        if quote.is_stale(now, self.max_age_secs) {
            tracing::warn!(
                asset = %asset,
                as_of = %quote.as_of,
                max_age_secs = self.max_age_secs,
                "stale oracle quote"
            );
            return Err(OracleError::StalePrice {
                asset: asset.clone(),
                as_of: quote.as_of,
                max_age_secs: self.max_age_secs,
            });
        }

        Ok(quote)
    }

    /// Read prices for every asset, failing on the first unusable quote
    pub async fn fetch_all<'a>(
        &self,
        oracle: &dyn PriceOracle,
        assets: impl IntoIterator<Item = &'a Asset>,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<Asset, Decimal>, OracleError> {
        let mut prices = BTreeMap::new();
        for asset in assets {
            if prices.contains_key(asset) {
                continue;
            }
            let quote = self.fetch(oracle, asset, now).await?;
            prices.insert(asset.clone(), quote.price);
        }
        Ok(prices)
    }
}
