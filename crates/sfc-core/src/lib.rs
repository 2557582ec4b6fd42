//! # SFC Core
//!
//! Shared building blocks for the SFC staking and reward ledger.
//!
//! This crate provides:
//! - `Address` and the identifier aliases used across the ledger
//! - `ValidatorStatus` - the validator status bitmask
//! - `decimal` - 18-decimal fixed-point helpers backed by 256-bit intermediates
//! - `EpochClock` - the sealed/current epoch counter
//! - `SfcError` - the error taxonomy shared by every ledger operation
//!
//! ## Amounts
//!
//! Every amount is a `u128` in the smallest token unit. Ratios are expressed
//! as fractions of [`decimal::UNIT`] (`10^18` == 100%).
//!
//! ```text
//!   1 token      = 1_000_000_000_000_000_000
//!   15% ratio    =   150_000_000_000_000_000
//! ```

pub mod clock;
pub mod decimal;
pub mod error;
pub mod types;

pub use clock::EpochClock;
pub use decimal::UNIT;
pub use error::{ErrorKind, Result, SfcError};
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::EpochClock;
    pub use crate::decimal::{self, mul_div, UNIT};
    pub use crate::error::{ErrorKind, Result, SfcError};
    pub use crate::types::*;
}
