//! Application context - wires the engine to scripted prices and time

use chrono::{Duration, Utc};
use lendbook_core::Asset;
use lendbook_engine::{Clock, LendingEngine, ManualClock};
use lendbook_oracle::MockOracle;
use lendbook_risk::{ConfigError, MarketConfig};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;

/// Application context
///
/// Prices come from a `MockOracle` and time from a `ManualClock`, so a
/// scenario replays identically on every run.
pub struct AppContext {
    pub engine: LendingEngine,
    pub oracle: Arc<MockOracle>,
    pub clock: Arc<ManualClock>,
}

impl AppContext {
    /// Load `config_path` (or the built-in markets) and apply `LENDBOOK_*` overrides
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => MarketConfig::from_file(path)?,
            None => MarketConfig::demo(),
        };
        config.apply_env_overrides()?;
        Ok(Self::new(config))
    }

    /// Context over `config`, with ETH and DAI quoted at the dashboard prices
    pub fn new(config: MarketConfig) -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let oracle = Arc::new(MockOracle::new());
        let engine = LendingEngine::in_memory(config, oracle.clone(), clock.clone());

        let ctx = Self {
            engine,
            oracle,
            clock,
        };
        ctx.set_price(Asset::eth(), Decimal::from(1640));
        ctx.set_price(Asset::dai(), Decimal::ONE);
        ctx
    }

    /// Quote `price` as of the current scenario time
    pub fn set_price(&self, asset: Asset, price: Decimal) {
        self.oracle.set_price_at(asset, price, self.clock.now());
    }

    /// Move scenario time forward; quotes keep their old timestamps
    pub fn advance(&self, seconds: i64) {
        self.clock.advance(Duration::seconds(seconds));
    }
}
