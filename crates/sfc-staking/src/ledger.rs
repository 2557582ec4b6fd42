//! # Validator & Delegation Ledger
//!
//! Validator records and per-(staker, validator) stake records.
//!
//! ```text
//!   Validator ──┬── StakeRecord (auth, id)        self-stake
//!               ├── StakeRecord (delegator A, id)
//!               └── StakeRecord (delegator B, id)
//!                      ├── stake            (unlocked + locked)
//!                      ├── lockups[id]      locked part + bonus terms
//!                      ├── stash            computed, unpaid rewards
//!                      └── withdrawals[wr]  undelegated, waiting
//! ```
//!
//! Records are never removed, lockups included; amounts drop to zero
//! instead so reward history stays addressable.

use crate::rewards::{AccrualStrategy, Rewards};
use serde::{Deserialize, Serialize};
use sfc_core::prelude::*;
use std::collections::BTreeMap;

/// Validator record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Validator ID
    pub id: ValidatorId,

    /// Controlling account
    pub auth: Address,

    /// Status bitmask
    pub status: ValidatorStatus,

    /// Epoch the validator was created in
    pub created_epoch: Epoch,

    /// Creation timestamp
    pub created_time: Timestamp,

    /// Epoch of the first deactivation (0 while active)
    pub deactivated_epoch: Epoch,

    /// Timestamp of the first deactivation (0 while active)
    pub deactivated_time: Timestamp,

    /// Sum of every stake record pointing at this validator
    pub received_stake: u128,

    /// Consensus public key
    pub pubkey: Vec<u8>,
}

impl Validator {
    pub fn is_active(&self) -> bool {
        self.status.is_ok()
    }

    pub fn is_deactivated(&self) -> bool {
        self.deactivated_epoch != 0
    }

    /// Weight reported to the driver: received stake, or 0 when not OK
    pub fn weight(&self) -> u128 {
        if self.status.is_ok() {
            self.received_stake
        } else {
            0
        }
    }
}

/// Time-locked part of a stake record
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockup {
    /// Lockup ID within its record
    pub id: LockupId,

    /// Amount locked
    pub locked_stake: u128,

    /// First epoch that earns the lockup bonus
    pub from_epoch: Epoch,

    /// When the lockup (or its last renewal) started
    pub start_time: Timestamp,

    /// When the lockup ends
    pub end_time: Timestamp,

    /// Committed duration in seconds
    pub duration: u64,

    /// Rewards for this lockup are stashed through this epoch
    pub stashed_until: Epoch,

    /// Lockup rewards earned so far; the base of the early-unlock penalty
    pub penalty_base: Rewards,

    /// Computed but unpaid rewards of this lockup
    pub stash: Rewards,
}

impl Lockup {
    /// Still holds stake and has not reached its end time
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.locked_stake != 0 && now <= self.end_time
    }
}

/// Undelegated stake waiting out the withdrawal period
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub epoch: Epoch,
    pub time: Timestamp,
    pub amount: u128,
}

/// Stake of one staker on one validator
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRecord {
    /// Whole stake, locked and unlocked
    pub stake: u128,

    /// Lockups by ID
    pub lockups: BTreeMap<LockupId, Lockup>,

    /// Next lockup ID to hand out
    pub next_lockup_id: LockupId,

    /// Rewards on the unlocked part are stashed through this epoch
    pub stashed_until: Epoch,

    /// Computed but unpaid rewards
    pub stash: Rewards,

    /// Pending withdrawals by request ID
    pub withdrawals: BTreeMap<WithdrawalRequestId, WithdrawalRequest>,
}

impl StakeRecord {
    /// Lockups that still hold stake
    pub fn holding_lockups(&self) -> impl Iterator<Item = &Lockup> {
        self.lockups.values().filter(|l| l.locked_stake != 0)
    }

    /// Lockups active at `now`
    pub fn active_lockups(&self, now: Timestamp) -> impl Iterator<Item = &Lockup> {
        self.lockups.values().filter(move |l| l.is_active(now))
    }

    /// Locked stake under `strategy`'s rules
    pub fn locked_stake(&self, strategy: &dyn AccrualStrategy, now: Timestamp) -> u128 {
        self.lockups
            .values()
            .filter(|l| strategy.holds_stake(l, now))
            .map(|l| l.locked_stake)
            .sum()
    }

    /// Stake free to undelegate or lock
    pub fn unlocked_stake(&self, strategy: &dyn AccrualStrategy, now: Timestamp) -> u128 {
        self.stake.saturating_sub(self.locked_stake(strategy, now))
    }

    /// Unpaid rewards of the record and all of its lockups
    pub fn unpaid(&self) -> Rewards {
        self.lockups
            .values()
            .fold(self.stash, |acc, l| acc + l.stash)
    }

    /// Clear and return every unpaid reward
    pub fn take_unpaid(&mut self) -> Rewards {
        let mut total = std::mem::take(&mut self.stash);
        for lockup in self.lockups.values_mut() {
            total += std::mem::take(&mut lockup.stash);
        }
        total
    }

    /// Release a lockup: its locked stake drops to zero and its unpaid
    /// rewards move to the record stash. The entry itself stays.
    pub fn close_lockup(&mut self, id: LockupId) {
        if let Some(lockup) = self.lockups.get_mut(&id) {
            lockup.locked_stake = 0;
            self.stash += std::mem::take(&mut lockup.stash);
        }
    }

    /// Allocate the next lockup ID (IDs start at 1)
    pub fn allocate_lockup_id(&mut self) -> LockupId {
        self.next_lockup_id = self.next_lockup_id.max(1);
        let id = self.next_lockup_id;
        self.next_lockup_id += 1;
        id
    }
}

/// Running totals
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accounting {
    /// Stake on every validator
    pub total_stake: u128,

    /// Stake on validators with OK status
    pub total_active_stake: u128,

    /// Withheld from slashed withdrawals
    pub total_slashed_stake: u128,

    /// Unlock penalties and the burnt share of fees
    pub total_burnt: u128,

    /// Treasury share of fees
    pub treasury: u128,

    /// Rewards paid out by claims or restaked
    pub total_rewards_paid: u128,

    /// Stake paid out by withdrawals
    pub total_withdrawn: u128,
}

/// Validator table, stake table and account balances
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// Validators by ID
    pub validators: BTreeMap<ValidatorId, Validator>,

    /// Validator ID owned by each authority
    pub validator_ids: BTreeMap<Address, ValidatorId>,

    /// Highest assigned validator ID
    pub last_validator_id: ValidatorId,

    /// Stake records by (staker, validator)
    pub stakes: BTreeMap<(Address, ValidatorId), StakeRecord>,

    /// Refund ratio applied to withdrawals from slashed validators
    pub slashing_refund_ratio: BTreeMap<ValidatorId, u128>,

    /// Paid-out balances
    pub balances: BTreeMap<Address, u128>,

    /// Totals
    pub accounting: Accounting,
}

impl Ledger {
    pub fn validator(&self, id: ValidatorId) -> Result<&Validator> {
        self.validators
            .get(&id)
            .ok_or(SfcError::ValidatorNotFound(id))
    }

    pub fn validator_mut(&mut self, id: ValidatorId) -> Result<&mut Validator> {
        self.validators
            .get_mut(&id)
            .ok_or(SfcError::ValidatorNotFound(id))
    }

    /// Validator owned by `auth`, if any
    pub fn validator_id_of(&self, auth: &Address) -> Option<ValidatorId> {
        self.validator_ids.get(auth).copied()
    }

    pub fn record(&self, staker: &Address, id: ValidatorId) -> Option<&StakeRecord> {
        self.stakes.get(&(*staker, id))
    }

    /// Record for (staker, id), created empty on first use
    pub fn record_mut(&mut self, staker: Address, id: ValidatorId) -> &mut StakeRecord {
        self.stakes.entry((staker, id)).or_default()
    }

    /// Whole stake of `staker` on validator `id`
    pub fn stake_of(&self, staker: &Address, id: ValidatorId) -> u128 {
        self.record(staker, id).map(|r| r.stake).unwrap_or(0)
    }

    /// Stake the validator's own authority holds on it
    pub fn self_stake(&self, id: ValidatorId) -> u128 {
        self.validators
            .get(&id)
            .map(|v| self.stake_of(&v.auth, id))
            .unwrap_or(0)
    }

    /// Latest end time among the validator's own active lockups (0 if none)
    pub fn validator_lockup_end(&self, id: ValidatorId, now: Timestamp) -> Timestamp {
        self.validators
            .get(&id)
            .and_then(|v| self.record(&v.auth, id))
            .and_then(|r| r.active_lockups(now).map(|l| l.end_time).max())
            .unwrap_or(0)
    }

    /// Received stake within `max_delegated_ratio` of self-stake
    pub fn delegation_within_limit(&self, id: ValidatorId, max_delegated_ratio: u128) -> bool {
        let received = self
            .validators
            .get(&id)
            .map(|v| v.received_stake)
            .unwrap_or(0);
        received <= decimal::apply_ratio(self.self_stake(id), max_delegated_ratio)
    }

    /// Sum of stake records for a validator (diagnostics and tests)
    pub fn sum_of_records(&self, id: ValidatorId) -> u128 {
        self.stakes
            .iter()
            .filter(|((_, vid), _)| *vid == id)
            .map(|(_, r)| r.stake)
            .sum()
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Credit a paid-out amount
    pub fn credit(&mut self, account: Address, amount: u128) -> Result<()> {
        let balance = self.balances.entry(account).or_insert(0);
        *balance = decimal::add(*balance, amount)?;
        Ok(())
    }

    /// Validators with OK status, by ID
    pub fn active_validator_ids(&self) -> Vec<ValidatorId> {
        self.validators
            .values()
            .filter(|v| v.is_active())
            .map(|v| v.id)
            .collect()
    }
}
