//! LendBook Ledger - Per-account balance store
//!
//! This is the single serialization point for account state. Every balance
//! change goes through `apply_delta`, which either commits all of its lines or
//! none of them.
//!
//! # Key Types
//! - `BalanceKind`: Collateral, Debt or Savings
//! - `BalanceDelta`: Signed changes keyed by (kind, asset)
//! - `AccountState` / `AccountSnapshot`: Live record and its read-only copy
//! - `LedgerStore`: Account map with one async lock per account
//! - `LiquidityPool`: System cash per asset
//! - `JournalSink`: Audit boundary for committed changes

pub mod account;
pub mod balance;
pub mod error;
pub mod journal;
pub mod pool;
pub mod store;

pub use account::{AccountSnapshot, AccountState};
pub use balance::{BalanceDelta, BalanceKind, DeltaLine};
pub use error::LedgerError;
pub use journal::{JournalSink, LedgerEvent, LedgerEventKind, MemoryJournal};
pub use pool::LiquidityPool;
pub use store::{AccountGuard, LedgerStore};
