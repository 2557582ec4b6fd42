//! # Epoch Snapshot Store
//!
//! Append-only sequence of sealed epoch aggregates, indexed by epoch number.
//! Epoch 0 is the genesis anchor that only carries the genesis time.
//!
//! Accumulated maps (reward-per-token, uptime, originated fee) carry every
//! validator forward from the previous snapshot, so a lookup at any epoch
//! returns the running total even for validators outside that epoch's set.

use serde::{Deserialize, Serialize};
use sfc_core::prelude::*;
use std::collections::BTreeMap;

/// Aggregates of one sealed epoch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSnapshot {
    /// Epoch number
    pub epoch: Epoch,

    /// Seal timestamp
    pub end_time: Timestamp,

    /// Validators that took part in the epoch
    pub validator_ids: Vec<ValidatorId>,

    /// Received stake of each validator when the epoch opened
    pub received_stake: BTreeMap<ValidatorId, u128>,

    /// Accumulated reward per token (scaled by UNIT)
    pub accumulated_reward_per_token: BTreeMap<ValidatorId, u128>,

    /// Accumulated uptime in seconds
    pub accumulated_uptime: BTreeMap<ValidatorId, u64>,

    /// Accumulated originated transaction fees
    pub accumulated_originated_fee: BTreeMap<ValidatorId, u128>,

    /// Offline time reported for the epoch
    pub offline_time: BTreeMap<ValidatorId, u64>,

    /// Offline blocks reported for the epoch
    pub offline_blocks: BTreeMap<ValidatorId, u64>,

    /// Fees originated during the epoch
    pub epoch_fee: u128,

    /// Sum of base reward weights
    pub total_base_reward_weight: u128,

    /// Sum of transaction reward weights
    pub total_tx_reward_weight: u128,

    /// Base reward rate in force when sealed
    pub base_reward_per_second: u128,

    /// Stake of the epoch's validator set when it opened
    pub total_stake: u128,
}

impl EpochSnapshot {
    /// Genesis anchor
    pub fn genesis(time: Timestamp) -> Self {
        Self {
            epoch: 0,
            end_time: time,
            ..Default::default()
        }
    }

    /// Accumulated reward per token of `id` at this epoch
    pub fn reward_per_token(&self, id: ValidatorId) -> u128 {
        self.accumulated_reward_per_token
            .get(&id)
            .copied()
            .unwrap_or(0)
    }
}

/// Validator set of the epoch being accumulated
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenEpoch {
    pub validator_ids: Vec<ValidatorId>,
    pub received_stake: BTreeMap<ValidatorId, u128>,
    pub total_stake: u128,
}

/// Sealed snapshots, epoch 0 through the last sealed epoch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStore {
    snapshots: Vec<EpochSnapshot>,
}

impl SnapshotStore {
    /// Store holding only the genesis anchor
    pub fn new(genesis_time: Timestamp) -> Self {
        Self {
            snapshots: vec![EpochSnapshot::genesis(genesis_time)],
        }
    }

    /// Rebuild from persisted snapshots; epochs must run 0, 1, 2, ...
    pub fn from_snapshots(snapshots: Vec<EpochSnapshot>) -> Result<Self> {
        if snapshots.is_empty() {
            return Err(SfcError::Internal("snapshot store needs a genesis anchor".into()));
        }
        for (i, snapshot) in snapshots.iter().enumerate() {
            if snapshot.epoch != i as Epoch {
                return Err(SfcError::Internal(format!(
                    "snapshot {} found at position {}",
                    snapshot.epoch, i
                )));
            }
        }
        Ok(Self { snapshots })
    }

    /// Snapshot of a sealed epoch
    pub fn get(&self, epoch: Epoch) -> Option<&EpochSnapshot> {
        self.snapshots.get(usize::try_from(epoch).ok()?)
    }

    /// Most recently sealed snapshot
    pub fn latest(&self) -> &EpochSnapshot {
        // never empty: constructed with the genesis anchor
        &self.snapshots[self.snapshots.len() - 1]
    }

    pub fn latest_epoch(&self) -> Epoch {
        self.latest().epoch
    }

    /// Epoch number the next appended snapshot must carry
    pub fn next_epoch(&self) -> Epoch {
        self.latest_epoch() + 1
    }

    /// Accumulated reward per token of `id` at `epoch` (0 if unknown)
    pub fn reward_per_token(&self, epoch: Epoch, id: ValidatorId) -> u128 {
        self.get(epoch).map(|s| s.reward_per_token(id)).unwrap_or(0)
    }

    /// End time of `epoch` (0 if unknown)
    pub fn end_time(&self, epoch: Epoch) -> Timestamp {
        self.get(epoch).map(|s| s.end_time).unwrap_or(0)
    }

    /// Append the next snapshot. Callers check `next_epoch` first.
    pub(crate) fn push(&mut self, snapshot: EpochSnapshot) {
        debug_assert_eq!(snapshot.epoch, self.next_epoch());
        self.snapshots.push(snapshot);
    }

    pub fn iter(&self) -> impl Iterator<Item = &EpochSnapshot> {
        self.snapshots.iter()
    }

    /// Snapshots after `epoch`
    pub fn since(&self, epoch: Epoch) -> &[EpochSnapshot] {
        let start = usize::try_from(epoch.saturating_add(1))
            .unwrap_or(usize::MAX)
            .min(self.snapshots.len());
        &self.snapshots[start..]
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
