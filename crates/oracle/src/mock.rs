//! Mock Oracle for testing
//!
//! Provides scripted prices, quote timestamps and failure modes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lendbook_core::Asset;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::error::OracleError;
use crate::types::{PriceOracle, PriceQuote};

/// Mock Price Oracle
///
/// Stores fixed quotes that can be updated programmatically. A configured
/// delay makes `get_price` sleep first, to exercise caller timeouts.
pub struct MockOracle {
    quotes: RwLock<HashMap<Asset, PriceQuote>>,
    delay: RwLock<Option<Duration>>,
    offline: RwLock<bool>,
}

impl MockOracle {
    /// Create a new empty mock oracle
    pub fn new() -> Self {
        Self {
            quotes: RwLock::new(HashMap::new()),
            delay: RwLock::new(None),
            offline: RwLock::new(false),
        }
    }

    /// Prices from the original savings/borrowing dashboard
    pub fn with_defaults() -> Self {
        let oracle = Self::new();
        oracle.set_price(Asset::eth(), Decimal::from(1640));
        oracle.set_price(Asset::dai(), Decimal::ONE);
        oracle
    }

    /// Set a price quoted now
    pub fn set_price(&self, asset: Asset, price: Decimal) {
        self.set_price_at(asset, price, Utc::now());
    }

    /// Set a price with an explicit quote time
    pub fn set_price_at(&self, asset: Asset, price: Decimal, as_of: DateTime<Utc>) {
        let quote = PriceQuote::new(asset.clone(), price, as_of).with_source("mock");
        self.quotes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(asset, quote);
    }

    /// Remove a price (for testing asset not found)
    pub fn remove_price(&self, asset: &Asset) {
        self.quotes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(asset);
    }

    /// Delay every answer by `delay`
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Simulate a dropped connection
    pub fn set_offline(&self, offline: bool) {
        *self.offline.write().unwrap_or_else(PoisonError::into_inner) = offline;
    }

    pub fn asset_count(&self) -> usize {
        self.quotes.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl PriceOracle for MockOracle {
    async fn get_price(&self, asset: &Asset) -> Result<PriceQuote, OracleError> {
        let delay = *self.delay.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.offline.read().unwrap_or_else(PoisonError::into_inner) {
            return Err(OracleError::ConnectionFailed {
                source: "mock oracle is offline".into(),
            });
        }

        self.quotes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(asset)
            .cloned()
            .ok_or_else(|| OracleError::AssetNotFound {
                asset: asset.clone(),
            })
    }

    async fn supported_assets(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self
            .quotes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        assets.sort();
        assets
    }
}
