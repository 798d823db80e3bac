//! LendBook Risk Engine
//!
//! Everything that turns balances and prices into policy decisions:
//! - `MarketConfig`: immutable per-asset parameters loaded at startup
//! - `InterestAccrual`: continuous-compounding interest on debt and savings
//! - `RiskEngine`: valuation, collateral ratio, health factor, borrow limits
//! - `LiquidationPlanner`: close-factor and bonus sizing for liquidations
//!
//! All arithmetic is decimal; nothing here touches floating point.

pub mod config;
pub mod engine;
pub mod error;
pub mod interest;
pub mod liquidation;

pub use config::{AssetConfig, MarketConfig, OverRepaymentPolicy};
pub use engine::{PortfolioSummary, Prices, RiskEngine, RiskLevel, RiskReport};
pub use error::{ConfigError, RiskError};
pub use interest::{growth_factor, AccrualRecord, InterestAccrual};
pub use liquidation::{LiquidationPlan, LiquidationPlanner};
