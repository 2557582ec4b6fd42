//! Epoch clock
//!
//! The ledger only ever tracks the last sealed epoch; the epoch currently
//! accumulating is always the next one. Storing a single counter makes
//! `current == sealed + 1` hold by construction.

use crate::types::Epoch;
use serde::{Deserialize, Serialize};

/// Sealed/current epoch counter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochClock {
    /// Last sealed epoch (0 before the first seal)
    sealed: Epoch,
}

impl EpochClock {
    /// Clock at genesis: nothing sealed, epoch 1 accumulating
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock restored from a persisted sealed epoch
    pub fn with_sealed(sealed: Epoch) -> Self {
        Self { sealed }
    }

    /// Last sealed epoch
    pub fn current_sealed_epoch(&self) -> Epoch {
        self.sealed
    }

    /// Epoch currently accumulating
    pub fn current_epoch(&self) -> Epoch {
        self.sealed + 1
    }

    /// Seal the current epoch, returning the newly sealed number
    pub fn advance(&mut self) -> Epoch {
        self.sealed += 1;
        self.sealed
    }
}
