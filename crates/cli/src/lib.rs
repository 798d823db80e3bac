//! LendBook CLI - Scenario runner
//!
//! This crate provides the `lendbook` binary: it loads a market configuration,
//! drives an in-memory `LendingEngine` with scripted prices and a manual clock,
//! and prints every result as JSON.

pub mod commands;
pub mod context;
pub mod scenario;

pub use context::AppContext;
pub use scenario::{Scenario, Step, StepReport};
