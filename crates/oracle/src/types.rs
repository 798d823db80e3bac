//! Core oracle types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lendbook_core::Asset;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::OracleError;

/// A price quote in the reference unit (e.g. USD)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub asset: Asset,
    pub price: Decimal,
    /// When the feed observed this price
    pub as_of: DateTime<Utc>,
    /// Source of the price (e.g., "mock", "chainlink")
    pub source: String,
}

impl PriceQuote {
    pub fn new(asset: Asset, price: Decimal, as_of: DateTime<Utc>) -> Self {
        Self {
            asset,
            price,
            as_of,
            source: "unknown".to_string(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Seconds between `as_of` and `now` (negative if quoted in the future)
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.as_of).num_seconds()
    }

    /// Check if the quote is older than `max_age_secs` at `now`
    pub fn is_stale(&self, now: DateTime<Utc>, max_age_secs: u64) -> bool {
        self.age_secs(now) > max_age_secs as i64
    }
}

/// Price Oracle Port - the engine's only view of market prices
///
/// Implementations can be:
/// - MockOracle: scripted prices for tests and the CLI
/// - feed adapters for external price services
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Get the latest quote for an asset
    async fn get_price(&self, asset: &Asset) -> Result<PriceQuote, OracleError>;

    /// Get quotes for several assets
    async fn get_prices(&self, assets: &[Asset]) -> Vec<Result<PriceQuote, OracleError>> {
        let mut results = Vec::new();
        for asset in assets {
            results.push(self.get_price(asset).await);
        }
        results
    }

    /// Assets this feed can quote
    async fn supported_assets(&self) -> Vec<Asset>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_staleness() {
        let now = Utc::now();
        let quote = PriceQuote::new(Asset::eth(), dec!(1640), now - Duration::seconds(61));

        assert_eq!(quote.age_secs(now), 61);
        assert!(quote.is_stale(now, 60));
        assert!(!quote.is_stale(now, 61));
    }

    #[test]
    fn test_future_quote_is_fresh() {
        let now = Utc::now();
        let quote = PriceQuote::new(Asset::eth(), dec!(1640), now + Duration::seconds(5));
        assert!(!quote.is_stale(now, 0));
    }
}
