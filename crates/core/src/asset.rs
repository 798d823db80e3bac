//! Asset - Validated asset codes
//!
//! Markets are configured at startup, so assets are not a closed enum: any
//! short alphanumeric code is accepted and normalized to upper case.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing asset codes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("Empty asset code")]
    EmptyCode,

    #[error("Asset code too long (max 10 chars): {0}")]
    TooLong(String),

    #[error("Invalid asset code format: {0}")]
    InvalidFormat(String),
}

/// Asset code (ETH, DAI, WBTC, ...)
///
/// # Examples
/// ```
/// use lendbook_core::Asset;
///
/// let eth: Asset = "eth".parse().unwrap();
/// assert_eq!(eth.code(), "ETH");
/// assert!("ETH-USD".parse::<Asset>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Asset(String);

impl Asset {
    /// Build an asset from a code already known to be valid (config keys, literals).
    ///
    /// Invalid codes are upper-cased and kept as-is; use `parse` for untrusted input.
    pub fn new(code: &str) -> Self {
        code.parse()
            .unwrap_or_else(|_| Asset(code.trim().to_uppercase()))
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    pub fn eth() -> Self {
        Asset("ETH".to_string())
    }

    pub fn dai() -> Self {
        Asset("DAI".to_string())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Asset {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();

        if s.is_empty() {
            return Err(AssetError::EmptyCode);
        }

        if s.len() > 10 {
            return Err(AssetError::TooLong(s));
        }

        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AssetError::InvalidFormat(s));
        }

        Ok(Asset(s))
    }
}

impl TryFrom<String> for Asset {
    type Error = AssetError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Asset> for String {
    fn from(a: Asset) -> Self {
        a.0
    }
}

impl From<&str> for Asset {
    fn from(s: &str) -> Self {
        Asset::new(s)
    }
}
