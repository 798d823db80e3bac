//! LendBook Engine - Position Operations API
//!
//! `LendingEngine` is the only entry point that changes balances. It wires the
//! ledger, the price oracle, the risk engine and a clock together and exposes
//! deposits, borrows, repayments, savings and liquidations as async calls.
//!
//! # Example
//! ```no_run
//! use lendbook_core::{AccountId, Asset};
//! use lendbook_engine::{LendingEngine, SystemClock};
//! use lendbook_oracle::MockOracle;
//! use lendbook_risk::MarketConfig;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), lendbook_engine::EngineError> {
//! let engine = LendingEngine::in_memory(
//!     MarketConfig::demo(),
//!     Arc::new(MockOracle::with_defaults()),
//!     Arc::new(SystemClock),
//! );
//! let alice = AccountId::from("alice");
//! engine.deposit_collateral(&alice, &Asset::eth(), Decimal::TWO).await?;
//! engine.borrow(&alice, &Asset::dai(), Decimal::from(1200)).await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod engine;
pub mod error;
pub mod outcome;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::LendingEngine;
pub use error::EngineError;
pub use outcome::{
    AccountRisk, BorrowPreview, LiquidationOutcome, LiquidatorCredit, PendingCredit,
    PositionSnapshot, RepayOutcome, RiskView,
};
