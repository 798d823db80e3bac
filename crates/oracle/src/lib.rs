//! LendBook Price Oracle Port
//!
//! The engine reads asset prices only through `PriceOracle`. `OraclePolicy`
//! wraps every read with a timeout and a staleness bound so that callers never
//! act on old or missing data. `MockOracle` is the scripted in-memory feed used
//! by tests and the CLI.

mod error;
mod mock;
mod policy;
mod types;

pub use error::OracleError;
pub use mock::MockOracle;
pub use policy::OraclePolicy;
pub use types::{PriceOracle, PriceQuote};
