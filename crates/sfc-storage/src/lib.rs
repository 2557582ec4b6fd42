//! # SFC Storage
//!
//! File persistence for the staking ledger.
//!
//! ## Storage Layout
//!
//! - `ledger.bin` - mutable ledger state, rewritten after every commit
//! - `snapshots/<epoch>.bin` - sealed epoch snapshots, append-only
//! - `driver.key` - the node driver's capability token
//!
//! Every file is a frame:
//!
//! ```text
//! ┌────────┬──────────────────┬─────────────────────┐
//! │ "SFC1" │ blake3(payload)  │ bincode payload     │
//! │ 4 B    │ 32 B             │ ...                 │
//! └────────┴──────────────────┴─────────────────────┘
//! ```
//!
//! Writes go to a temporary file in the same directory and are renamed
//! into place, so a crash never leaves a torn file behind.

pub mod error;
pub mod frame;
pub mod ledger_db;

pub use error::{Result, StorageError};
pub use ledger_db::LedgerStore;
