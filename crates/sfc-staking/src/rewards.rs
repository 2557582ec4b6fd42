//! # Reward Accrual Engine
//!
//! Rewards are a fold over sealed snapshots between a position's
//! stashed-through marker and the validator's highest payable epoch. Each
//! epoch contributes `amount * delta(reward_per_token) / UNIT`, scaled by
//! the unlocked reward ratio or by the lockup bonus.
//!
//! ## Lockup bonus
//!
//! ```text
//!   extra_ratio = (1 - unlocked_ratio) * duration / max_lockup_duration
//!   total       = full * (unlocked_ratio + extra_ratio)
//!   base        = full * unlocked_ratio
//!   extra       = total - base
//! ```
//!
//! Two accrual schemes exist and are selected per ledger:
//!
//! | | Legacy | MultiLock |
//! |---|---|---|
//! | lockups per delegation | one active | many, by ID |
//! | bonus epochs | end no later than lockup end | start before lockup end |
//! | rounding | one division per range | one division per epoch |
//! | expired lockups | released when stashed | kept until unlocked |
//! | relock | duration may not shrink | amount must be non-zero |

use crate::ledger::{Lockup, StakeRecord};
use crate::params::RewardScaling;
use crate::snapshot::SnapshotStore;
use serde::{Deserialize, Serialize};
use sfc_core::prelude::*;
use std::fmt;
use std::ops::{Add, AddAssign};

/// Reward split by origin
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewards {
    /// Bonus earned above the unlocked ratio by locked stake
    pub lockup_extra: u128,
    /// Unlocked-ratio part earned by locked stake
    pub lockup_base: u128,
    /// Earned by unlocked stake
    pub unlocked: u128,
}

impl Rewards {
    pub fn total(&self) -> u128 {
        self.lockup_extra
            .saturating_add(self.lockup_base)
            .saturating_add(self.unlocked)
    }

    /// Part earned by locked stake
    pub fn lockup_total(&self) -> u128 {
        self.lockup_extra.saturating_add(self.lockup_base)
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

impl Add for Rewards {
    type Output = Rewards;

    fn add(self, rhs: Rewards) -> Rewards {
        Rewards {
            lockup_extra: self.lockup_extra.saturating_add(rhs.lockup_extra),
            lockup_base: self.lockup_base.saturating_add(rhs.lockup_base),
            unlocked: self.unlocked.saturating_add(rhs.unlocked),
        }
    }
}

impl AddAssign for Rewards {
    fn add_assign(&mut self, rhs: Rewards) {
        *self = *self + rhs;
    }
}

/// Split a full reward into lockup extra/base, or unlocked when `duration` is 0
pub fn scale_lockup_reward(full: u128, duration: u64, scaling: &RewardScaling) -> Rewards {
    let unlocked_ratio = scaling.unlocked_reward_ratio;
    if duration == 0 {
        return Rewards {
            unlocked: decimal::apply_ratio(full, unlocked_ratio),
            ..Default::default()
        };
    }
    let max_extra_ratio = UNIT.saturating_sub(unlocked_ratio);
    let extra_ratio = mul_div(
        max_extra_ratio,
        u128::from(duration),
        u128::from(scaling.max_lockup_duration),
    );
    let total = decimal::apply_ratio(full, unlocked_ratio.saturating_add(extra_ratio));
    let base = decimal::apply_ratio(full, unlocked_ratio);
    Rewards {
        lockup_extra: total.saturating_sub(base),
        lockup_base: base,
        unlocked: 0,
    }
}

/// Full (unscaled) reward of `amount` between two sealed epochs
pub fn rewards_of(
    snapshots: &SnapshotStore,
    amount: u128,
    validator_id: ValidatorId,
    from: Epoch,
    to: Epoch,
) -> u128 {
    if amount == 0 || from >= to {
        return 0;
    }
    let from_rate = snapshots.reward_per_token(from, validator_id);
    let to_rate = snapshots.reward_per_token(to, validator_id);
    mul_div(to_rate.saturating_sub(from_rate), amount, UNIT)
}

/// Result of folding a stake record forward
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Accrued {
    /// Earned by the unlocked part of the stake
    pub unlocked: Rewards,
    /// Earned by each lockup
    pub per_lockup: Vec<(LockupId, Rewards)>,
}

impl Accrued {
    pub fn total(&self) -> Rewards {
        self.per_lockup
            .iter()
            .fold(self.unlocked, |acc, (_, r)| acc + *r)
    }

    pub fn for_lockup(&self, id: LockupId) -> Rewards {
        self.per_lockup
            .iter()
            .filter(|(lock_id, _)| *lock_id == id)
            .fold(Rewards::default(), |acc, (_, r)| acc + *r)
    }
}

/// Accrual scheme identifier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccrualVersion {
    /// Single active lockup, range folds
    Legacy,
    /// Many lockups by ID, per-epoch folds
    #[default]
    MultiLock,
}

impl AccrualVersion {
    /// Strategy implementing this scheme
    pub fn strategy(self) -> &'static dyn AccrualStrategy {
        match self {
            Self::Legacy => &LegacyAccrual,
            Self::MultiLock => &MultiLockAccrual,
        }
    }
}

impl fmt::Display for AccrualVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy"),
            Self::MultiLock => f.write_str("multilock"),
        }
    }
}

/// Versioned accrual rules
pub trait AccrualStrategy: Sync {
    fn version(&self) -> AccrualVersion;

    /// Rewards of `record` from its markers through `payable_until`
    fn accrue(
        &self,
        record: &StakeRecord,
        validator_id: ValidatorId,
        payable_until: Epoch,
        snapshots: &SnapshotStore,
        scaling: &RewardScaling,
    ) -> Accrued;

    /// Whether the lockup's stake counts as locked at `now`
    fn holds_stake(&self, lockup: &Lockup, now: Timestamp) -> bool;

    /// Expired lockups are emptied when the record is stashed
    fn releases_expired(&self) -> bool;

    /// More than one lockup may be active on a delegation
    fn allows_concurrent_lockups(&self) -> bool;

    /// Scheme-specific relock checks that run before any state change
    fn check_relock_amount(&self, amount: u128) -> Result<()>;

    /// Scheme-specific relock checks against the existing lockup
    fn check_relock_duration(&self, lockup: &Lockup, duration: u64) -> Result<()>;
}

/// Single-lockup scheme
#[derive(Clone, Copy, Debug, Default)]
pub struct LegacyAccrual;

impl LegacyAccrual {
    /// Last epoch in `[from_epoch, payable_until]` that ended no later than
    /// the lockup, or `from_epoch - 1` when none did
    fn highest_lockup_epoch(
        lockup: &Lockup,
        payable_until: Epoch,
        snapshots: &SnapshotStore,
    ) -> Epoch {
        let (mut lo, mut hi) = (lockup.from_epoch, payable_until.saturating_add(1));
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if snapshots.end_time(mid) <= lockup.end_time {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo.saturating_sub(1)
    }
}

impl AccrualStrategy for LegacyAccrual {
    fn version(&self) -> AccrualVersion {
        AccrualVersion::Legacy
    }

    fn accrue(
        &self,
        record: &StakeRecord,
        validator_id: ValidatorId,
        payable_until: Epoch,
        snapshots: &SnapshotStore,
        scaling: &RewardScaling,
    ) -> Accrued {
        let stashed = record.stashed_until;
        let whole = record.stake;
        let mut accrued = Accrued::default();

        let Some(lockup) = record.holding_lockups().next() else {
            let full = rewards_of(snapshots, whole, validator_id, stashed, payable_until);
            accrued.unlocked = scale_lockup_reward(full, 0, scaling);
            return accrued;
        };

        let locked_until = Self::highest_lockup_epoch(lockup, payable_until, snapshots)
            .clamp(stashed, payable_until.max(stashed));
        let unlocked_part = whole.saturating_sub(lockup.locked_stake);

        let full = rewards_of(snapshots, lockup.locked_stake, validator_id, stashed, locked_until);
        let locked_reward = scale_lockup_reward(full, lockup.duration, scaling);

        let full = rewards_of(snapshots, unlocked_part, validator_id, stashed, locked_until);
        let during_lockup = scale_lockup_reward(full, 0, scaling);

        let full = rewards_of(snapshots, whole, validator_id, locked_until, payable_until);
        let after_lockup = scale_lockup_reward(full, 0, scaling);

        accrued.unlocked = during_lockup + after_lockup;
        accrued.per_lockup.push((lockup.id, locked_reward));
        accrued
    }

    fn holds_stake(&self, lockup: &Lockup, now: Timestamp) -> bool {
        lockup.is_active(now)
    }

    fn releases_expired(&self) -> bool {
        true
    }

    fn allows_concurrent_lockups(&self) -> bool {
        false
    }

    fn check_relock_amount(&self, _amount: u128) -> Result<()> {
        Ok(())
    }

    fn check_relock_duration(&self, lockup: &Lockup, duration: u64) -> Result<()> {
        if duration < lockup.duration {
            return Err(SfcError::LockupDurationDecrease);
        }
        Ok(())
    }
}

/// Multi-lockup scheme
#[derive(Clone, Copy, Debug, Default)]
pub struct MultiLockAccrual;

impl MultiLockAccrual {
    fn fold_epochs(
        amount: u128,
        validator_id: ValidatorId,
        from: Epoch,
        to: Epoch,
        snapshots: &SnapshotStore,
        mut scale: impl FnMut(Epoch, u128) -> Rewards,
    ) -> Rewards {
        let mut total = Rewards::default();
        if amount == 0 {
            return total;
        }
        let mut prev_rate = snapshots.reward_per_token(from, validator_id);
        for epoch in from.saturating_add(1)..=to {
            let rate = snapshots.reward_per_token(epoch, validator_id);
            let full = mul_div(rate.saturating_sub(prev_rate), amount, UNIT);
            prev_rate = rate;
            if full != 0 {
                total += scale(epoch, full);
            }
        }
        total
    }
}

impl AccrualStrategy for MultiLockAccrual {
    fn version(&self) -> AccrualVersion {
        AccrualVersion::MultiLock
    }

    fn accrue(
        &self,
        record: &StakeRecord,
        validator_id: ValidatorId,
        payable_until: Epoch,
        snapshots: &SnapshotStore,
        scaling: &RewardScaling,
    ) -> Accrued {
        let locked: u128 = record.holding_lockups().map(|l| l.locked_stake).sum();
        let unlocked_part = record.stake.saturating_sub(locked);

        let unlocked = Self::fold_epochs(
            unlocked_part,
            validator_id,
            record.stashed_until,
            payable_until,
            snapshots,
            |_, full| scale_lockup_reward(full, 0, scaling),
        );

        let per_lockup = record
            .holding_lockups()
            .map(|lockup| {
                let earned = Self::fold_epochs(
                    lockup.locked_stake,
                    validator_id,
                    lockup.stashed_until,
                    payable_until,
                    snapshots,
                    |epoch, full| {
                        // bonus while the lockup was running when the epoch began
                        let started_locked = lockup.from_epoch <= epoch
                            && snapshots.end_time(epoch - 1) < lockup.end_time;
                        let duration = if started_locked { lockup.duration } else { 0 };
                        scale_lockup_reward(full, duration, scaling)
                    },
                );
                (lockup.id, earned)
            })
            .collect();

        Accrued {
            unlocked,
            per_lockup,
        }
    }

    fn holds_stake(&self, lockup: &Lockup, _now: Timestamp) -> bool {
        lockup.locked_stake != 0
    }

    fn releases_expired(&self) -> bool {
        false
    }

    fn allows_concurrent_lockups(&self) -> bool {
        true
    }

    fn check_relock_amount(&self, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(SfcError::ZeroAmount);
        }
        Ok(())
    }

    fn check_relock_duration(&self, _lockup: &Lockup, _duration: u64) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::EpochSnapshot;

    const DAY: u64 = 86_400;

    fn scaling() -> RewardScaling {
        RewardScaling {
            unlocked_reward_ratio: UNIT * 30 / 100,
            max_lockup_duration: 365 * DAY,
        }
    }

    fn store(rates: &[(Timestamp, u128)]) -> SnapshotStore {
        let mut store = SnapshotStore::new(0);
        for (i, (end_time, rpt)) in rates.iter().enumerate() {
            let mut s = EpochSnapshot {
                epoch: i as Epoch + 1,
                end_time: *end_time,
                ..Default::default()
            };
            s.accumulated_reward_per_token.insert(1, *rpt);
            store.push(s);
        }
        store
    }

    #[test]
    fn test_scale_lockup_reward_fixture() {
        let full = 482_954_545_454_545_454;
        let r = scale_lockup_reward(full, 14 * DAY, &scaling());
        assert_eq!(r.lockup_base, 144_886_363_636_363_636);
        assert_eq!(r.lockup_extra, 12_966_998_754_669_987);
        assert_eq!(r.unlocked, 0);
    }

    #[test]
    fn test_scale_unlocked_and_max_lockup() {
        let r = scale_lockup_reward(1000, 0, &scaling());
        assert_eq!(r, Rewards { unlocked: 300, ..Default::default() });

        let r = scale_lockup_reward(1000, 365 * DAY, &scaling());
        assert_eq!(r.total(), 1000);
        assert_eq!(r.lockup_base, 300);
    }

    #[test]
    fn test_bonus_ratio_monotonic_in_duration() {
        let mut last = 0;
        for days in [0u64, 14, 30, 90, 180, 365] {
            let total = scale_lockup_reward(UNIT, days * DAY, &scaling()).total();
            assert!(total >= last);
            last = total;
        }
    }

    #[test]
    fn test_rewards_of_range() {
        let snapshots = store(&[(10, 5 * UNIT), (20, 7 * UNIT)]);
        assert_eq!(rewards_of(&snapshots, 2 * UNIT, 1, 0, 2), 14 * UNIT);
        assert_eq!(rewards_of(&snapshots, 2 * UNIT, 1, 1, 2), 4 * UNIT);
        assert_eq!(rewards_of(&snapshots, 2 * UNIT, 1, 2, 2), 0);
        assert_eq!(rewards_of(&snapshots, 0, 1, 0, 2), 0);
    }

    fn locked_record(end_time: Timestamp) -> StakeRecord {
        let mut record = StakeRecord {
            stake: 10 * UNIT,
            ..Default::default()
        };
        record.lockups.insert(
            1,
            Lockup {
                id: 1,
                locked_stake: UNIT,
                from_epoch: 1,
                start_time: 0,
                end_time,
                duration: 14 * DAY,
                ..Default::default()
            },
        );
        record
    }

    #[test]
    fn test_legacy_bonus_stops_after_lockup_end() {
        // epochs end at 100 and 300; lockup ends at 200
        let snapshots = store(&[(100, 1000 * UNIT), (300, 2000 * UNIT)]);
        let record = locked_record(200);
        let accrued = LegacyAccrual.accrue(&record, 1, 2, &snapshots, &scaling());

        let lockup = accrued.for_lockup(1);
        let expected = scale_lockup_reward(1000 * UNIT, 14 * DAY, &scaling());
        assert_eq!(lockup, expected);
        // 9 unlocked tokens for epoch 1, all 10 for epoch 2
        assert_eq!(accrued.unlocked.unlocked, 300 * (9 * UNIT) + 300 * (10 * UNIT));
    }

    #[test]
    fn test_multilock_bonus_for_epoch_started_before_end() {
        let snapshots = store(&[(100, 1000 * UNIT), (300, 2000 * UNIT), (400, 3000 * UNIT)]);
        let record = locked_record(200);
        let accrued = MultiLockAccrual.accrue(&record, 1, 3, &snapshots, &scaling());

        // epochs 1 and 2 began before 200, epoch 3 did not
        let bonus = scale_lockup_reward(1000 * UNIT, 14 * DAY, &scaling());
        let plain = scale_lockup_reward(1000 * UNIT, 0, &scaling());
        assert_eq!(accrued.for_lockup(1), bonus + bonus + plain);
        assert_eq!(accrued.unlocked.unlocked, 3 * 300 * (9 * UNIT));
    }

    #[test]
    fn test_multilock_truncates_per_epoch() {
        // each epoch adds 1.5 wei per token-unit; 1 wei of stake gets 1 per epoch
        let snapshots = store(&[(10, 3 * UNIT / 2), (20, 3 * UNIT)]);
        let record = StakeRecord {
            stake: 1,
            ..Default::default()
        };
        let multi = MultiLockAccrual.accrue(&record, 1, 2, &snapshots, &RewardScaling {
            unlocked_reward_ratio: UNIT,
            max_lockup_duration: 365 * DAY,
        });
        let legacy = LegacyAccrual.accrue(&record, 1, 2, &snapshots, &RewardScaling {
            unlocked_reward_ratio: UNIT,
            max_lockup_duration: 365 * DAY,
        });
        assert_eq!(multi.unlocked.unlocked, 2);
        assert_eq!(legacy.unlocked.unlocked, 3);
    }

    #[test]
    fn test_strategy_lookup() {
        assert_eq!(AccrualVersion::Legacy.strategy().version(), AccrualVersion::Legacy);
        assert_eq!(AccrualVersion::MultiLock.strategy().version(), AccrualVersion::MultiLock);
        assert!(AccrualVersion::Legacy.strategy().releases_expired());
        assert!(!AccrualVersion::MultiLock.strategy().releases_expired());
    }
}
