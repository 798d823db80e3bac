//! LendBook Core - Domain types
//!
//! This crate contains the fundamental types used across LendBook:
//! - `Amount`: Non-negative fixed-point quantity for balances
//! - `Asset`: Validated asset code (ETH, DAI, ...)
//! - `AccountId`: Opaque account key
//! - `CollateralRatio`: Percentage ratio with an infinite sentinel

pub mod account;
pub mod amount;
pub mod asset;
pub mod ratio;

pub use account::AccountId;
pub use amount::{round_down, round_up, Amount, AmountError, AMOUNT_SCALE, MAX_AMOUNT, MAX_PRICE};
pub use asset::{Asset, AssetError};
pub use ratio::CollateralRatio;
