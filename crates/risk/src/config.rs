//! Market configuration
//!
//! Loaded once at process start and shared read-only behind an `Arc`.
//! Changes take effect on restart only.

use lendbook_core::{Asset, MAX_AMOUNT};
use lendbook_oracle::OraclePolicy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, RiskError};

/// Per-asset lending parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Maximum loan-to-value, 0 < f <= 1
    pub collateral_factor: Decimal,
    /// Ratio (percent) at or below which a position may be liquidated
    pub liquidation_threshold: Decimal,
    /// Annual yield on savings, as a fraction (0.052 = 5.2%)
    pub savings_apy: Decimal,
    /// Annual rate on debt, as a fraction
    pub borrow_apr: Decimal,
    /// Reserves seeded into the liquidity pool at startup
    #[serde(default)]
    pub initial_liquidity: Decimal,
}

/// What to do with the part of a repayment that exceeds the debt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverRepaymentPolicy {
    /// Reject the whole repayment
    #[default]
    Reject,
    /// Repay the debt in full and hand the excess back
    Refund,
}

/// Engine-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Ratio (percent) at or above which a position is classified Safe
    #[serde(default = "default_safe_threshold")]
    pub safe_threshold: Decimal,

    /// Quotes older than this are stale
    #[serde(default = "default_max_oracle_age_secs")]
    pub max_oracle_age_secs: u64,

    /// Time allowed for one oracle read
    #[serde(default = "default_oracle_timeout_ms")]
    pub oracle_timeout_ms: u64,

    /// Maximum fraction of a debt closed by one liquidation
    #[serde(default = "default_close_factor")]
    pub close_factor: Decimal,

    /// Extra collateral paid to the liquidator, as a fraction
    #[serde(default = "default_liquidation_bonus")]
    pub liquidation_bonus: Decimal,

    #[serde(default)]
    pub over_repayment: OverRepaymentPolicy,

    pub assets: BTreeMap<Asset, AssetConfig>,
}

fn default_safe_threshold() -> Decimal {
    Decimal::new(200, 0)
}

fn default_max_oracle_age_secs() -> u64 {
    60
}

fn default_oracle_timeout_ms() -> u64 {
    2_000
}

fn default_close_factor() -> Decimal {
    Decimal::new(50, 2) // 50%
}

fn default_liquidation_bonus() -> Decimal {
    Decimal::new(5, 2) // 5%
}

impl MarketConfig {
    /// Config with default engine knobs and the given assets
    pub fn with_assets(assets: BTreeMap<Asset, AssetConfig>) -> Self {
        Self {
            safe_threshold: default_safe_threshold(),
            max_oracle_age_secs: default_max_oracle_age_secs(),
            oracle_timeout_ms: default_oracle_timeout_ms(),
            close_factor: default_close_factor(),
            liquidation_bonus: default_liquidation_bonus(),
            over_repayment: OverRepaymentPolicy::default(),
            assets,
        }
    }

    /// ETH and DAI markets as quoted on the savings/borrowing dashboard
    pub fn demo() -> Self {
        let mut assets = BTreeMap::new();
        assets.insert(
            Asset::eth(),
            AssetConfig {
                collateral_factor: Decimal::new(75, 2),
                liquidation_threshold: Decimal::new(120, 0),
                savings_apy: Decimal::new(52, 3),
                borrow_apr: Decimal::new(38, 3),
                initial_liquidity: Decimal::ZERO,
            },
        );
        assets.insert(
            Asset::dai(),
            AssetConfig {
                collateral_factor: Decimal::new(75, 2),
                liquidation_threshold: Decimal::new(120, 0),
                savings_apy: Decimal::new(48, 3),
                borrow_apr: Decimal::new(38, 3),
                initial_liquidity: Decimal::ZERO,
            },
        );
        Self::with_assets(assets)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Apply `LENDBOOK_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (environment, test map)
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        fn parse<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidOverride {
                    key: key.to_string(),
                    value,
                })
        }

        if let Some(value) = lookup("LENDBOOK_MAX_ORACLE_AGE_SECS") {
            self.max_oracle_age_secs = parse("LENDBOOK_MAX_ORACLE_AGE_SECS", value)?;
        }
        if let Some(value) = lookup("LENDBOOK_ORACLE_TIMEOUT_MS") {
            self.oracle_timeout_ms = parse("LENDBOOK_ORACLE_TIMEOUT_MS", value)?;
        }
        if let Some(value) = lookup("LENDBOOK_CLOSE_FACTOR") {
            self.close_factor = parse("LENDBOOK_CLOSE_FACTOR", value)?;
        }
        if let Some(value) = lookup("LENDBOOK_LIQUIDATION_BONUS") {
            self.liquidation_bonus = parse("LENDBOOK_LIQUIDATION_BONUS", value)?;
        }

        self.validate()
    }

    /// Reject configurations the engine cannot honor
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.assets.is_empty() {
            return Err(ConfigError::Invalid("no assets configured".to_string()));
        }
        if self.close_factor <= Decimal::ZERO || self.close_factor > Decimal::ONE {
            return Err(ConfigError::Invalid(format!(
                "close_factor must be in (0, 1], got {}",
                self.close_factor
            )));
        }
        if self.liquidation_bonus < Decimal::ZERO {
            return Err(ConfigError::Invalid(format!(
                "liquidation_bonus must be >= 0, got {}",
                self.liquidation_bonus
            )));
        }
        if self.oracle_timeout_ms == 0 {
            return Err(ConfigError::Invalid("oracle_timeout_ms must be > 0".to_string()));
        }

        for (asset, cfg) in &self.assets {
            if cfg.collateral_factor <= Decimal::ZERO || cfg.collateral_factor > Decimal::ONE {
                return Err(ConfigError::Invalid(format!(
                    "{asset}: collateral_factor must be in (0, 1], got {}",
                    cfg.collateral_factor
                )));
            }
            if cfg.liquidation_threshold <= Decimal::ONE_HUNDRED {
                return Err(ConfigError::Invalid(format!(
                    "{asset}: liquidation_threshold must exceed 100%, got {}",
                    cfg.liquidation_threshold
                )));
            }
            if cfg.liquidation_threshold >= self.safe_threshold {
                return Err(ConfigError::Invalid(format!(
                    "{asset}: liquidation_threshold {} must be below safe_threshold {}",
                    cfg.liquidation_threshold, self.safe_threshold
                )));
            }
            if cfg.savings_apy < Decimal::ZERO || cfg.borrow_apr < Decimal::ZERO {
                return Err(ConfigError::Invalid(format!("{asset}: rates must be >= 0")));
            }
            if cfg.initial_liquidity < Decimal::ZERO || cfg.initial_liquidity > MAX_AMOUNT {
                return Err(ConfigError::Invalid(format!(
                    "{asset}: initial_liquidity must be in [0, {MAX_AMOUNT}]"
                )));
            }
        }

        Ok(())
    }

    pub fn asset(&self, asset: &Asset) -> Result<&AssetConfig, RiskError> {
        self.assets
            .get(asset)
            .ok_or_else(|| RiskError::UnknownAsset(asset.clone()))
    }

    /// Highest liquidation threshold across all markets
    pub fn max_liquidation_threshold(&self) -> Decimal {
        self.assets
            .values()
            .map(|cfg| cfg.liquidation_threshold)
            .max()
            .unwrap_or(Decimal::ONE_HUNDRED)
    }

    pub fn oracle_policy(&self) -> OraclePolicy {
        OraclePolicy::new(
            self.max_oracle_age_secs,
            Duration::from_millis(self.oracle_timeout_ms),
        )
    }
}
