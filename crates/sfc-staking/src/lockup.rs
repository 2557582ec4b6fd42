//! Lockup manager
//!
//! A lockup commits part of a delegation for `duration` seconds in return
//! for the lockup bonus. Unlocking before the end time burns a penalty
//! taken from the rewards the lockup has earned:
//!
//! ```text
//!   extra_share = penalty_base.extra * amount / locked
//!   base_share  = penalty_base.base  * amount / locked
//!   penalty     = min(extra_share + base_share / 2, amount)
//! ```
//!
//! Both shares leave the penalty base whether or not a penalty is due, so
//! unlocking in parts costs the same as unlocking at once.

use crate::ledger::Lockup;
use crate::sfc::Tx;
use sfc_core::prelude::*;
use tracing::debug;

impl Tx<'_> {
    fn check_lockup_duration(&self, duration: u64) -> Result<()> {
        let constants = self.constants();
        if duration < constants.min_lockup_duration() || duration > constants.max_lockup_duration() {
            return Err(SfcError::IncorrectDuration);
        }
        Ok(())
    }

    /// Validator must be OK, and a delegator's lockup may not outlast the
    /// validator's own.
    fn check_lockup_target(
        &self,
        staker: &Address,
        validator_id: ValidatorId,
        end_time: Timestamp,
    ) -> Result<()> {
        let validator = self.state.ledger.validator(validator_id)?;
        if !validator.is_active() {
            return Err(SfcError::ValidatorNotActive(validator_id));
        }
        if *staker != validator.auth
            && self.state.ledger.validator_lockup_end(validator_id, self.now) < end_time
        {
            return Err(SfcError::ValidatorLockupEndsEarlier);
        }
        Ok(())
    }

    pub(crate) fn lock_stake(
        &mut self,
        staker: Address,
        validator_id: ValidatorId,
        duration: u64,
        amount: u128,
    ) -> Result<LockupId> {
        if amount == 0 {
            return Err(SfcError::ZeroAmount);
        }
        let strategy = self.strategy();
        let now = self.now;
        if !strategy.allows_concurrent_lockups() {
            if let Some(active) = self
                .state
                .ledger
                .record(&staker, validator_id)
                .and_then(|r| r.active_lockups(now).next())
            {
                return Err(SfcError::AlreadyLockedUp(active.id));
            }
        }
        self.check_lockup_duration(duration)?;
        self.state.ledger.validator(validator_id)?;

        self.stash_rewards_of(staker, validator_id)?;

        let unlocked = self
            .state
            .ledger
            .record(&staker, validator_id)
            .map(|r| r.unlocked_stake(strategy, now))
            .unwrap_or(0);
        if amount > unlocked {
            return Err(SfcError::NotEnoughStake);
        }
        let end_time = now.saturating_add(duration);
        self.check_lockup_target(&staker, validator_id, end_time)?;

        let from_epoch = self.current_epoch();
        let record = self.state.ledger.record_mut(staker, validator_id);
        let id = if strategy.allows_concurrent_lockups() {
            record.allocate_lockup_id()
        } else {
            // the single slot is reinitialised in place
            record.close_lockup(1);
            1
        };
        record.lockups.insert(
            id,
            Lockup {
                id,
                locked_stake: amount,
                from_epoch,
                start_time: now,
                end_time,
                duration,
                stashed_until: record.stashed_until,
                ..Default::default()
            },
        );

        debug!(staker = %staker, validator_id, lock_id = id, duration, amount = %decimal::format_tokens(amount), "stake locked");
        Ok(id)
    }

    pub(crate) fn relock_stake(
        &mut self,
        staker: Address,
        validator_id: ValidatorId,
        lock_id: LockupId,
        duration: u64,
        amount: u128,
    ) -> Result<()> {
        let strategy = self.strategy();
        let now = self.now;
        strategy.check_relock_amount(amount)?;
        self.check_lockup_duration(duration)?;
        self.state.ledger.validator(validator_id)?;

        self.stash_rewards_of(staker, validator_id)?;

        let record = self
            .state
            .ledger
            .record(&staker, validator_id)
            .ok_or(SfcError::NotEnoughStake)?;
        if amount > record.unlocked_stake(strategy, now) {
            return Err(SfcError::NotEnoughStake);
        }
        let lockup = record
            .lockups
            .get(&lock_id)
            .filter(|l| strategy.holds_stake(l, now))
            .ok_or(SfcError::NotLockedUp)?;
        strategy.check_relock_duration(lockup, duration)?;

        let end_time = now.saturating_add(duration);
        self.check_lockup_target(&staker, validator_id, end_time)?;

        let from_epoch = self.current_epoch();
        let lockup = self
            .state
            .ledger
            .record_mut(staker, validator_id)
            .lockups
            .get_mut(&lock_id)
            .ok_or(SfcError::NotLockedUp)?;
        lockup.locked_stake = decimal::add(lockup.locked_stake, amount)?;
        lockup.from_epoch = from_epoch;
        lockup.start_time = now;
        lockup.end_time = end_time;
        lockup.duration = duration;

        debug!(staker = %staker, validator_id, lock_id, duration, amount = %decimal::format_tokens(amount), "stake relocked");
        Ok(())
    }

    pub(crate) fn unlock_stake(
        &mut self,
        staker: Address,
        validator_id: ValidatorId,
        lock_id: LockupId,
        amount: u128,
    ) -> Result<u128> {
        if amount == 0 {
            return Err(SfcError::ZeroAmount);
        }
        let strategy = self.strategy();
        let now = self.now;
        let locked = self
            .state
            .ledger
            .record(&staker, validator_id)
            .and_then(|r| r.lockups.get(&lock_id))
            .filter(|l| strategy.holds_stake(l, now))
            .map(|l| l.locked_stake)
            .ok_or(SfcError::NotLockedUp)?;
        if amount > locked {
            return Err(SfcError::NotEnoughLockedStake);
        }

        self.stash_rewards_of(staker, validator_id)?;

        let record = self.state.ledger.record_mut(staker, validator_id);
        let lockup = record
            .lockups
            .get_mut(&lock_id)
            .ok_or(SfcError::NotLockedUp)?;
        let penalty = pop_unlock_penalty(lockup, amount, now);
        lockup.locked_stake -= amount;
        if lockup.locked_stake == 0 {
            record.close_lockup(lock_id);
        }

        if penalty != 0 {
            self.raw_undelegate(staker, validator_id, penalty, false)?;
            let accounting = &mut self.state.ledger.accounting;
            accounting.total_burnt = decimal::add(accounting.total_burnt, penalty)?;
        }

        debug!(staker = %staker, validator_id, lock_id, amount = %decimal::format_tokens(amount), penalty = %penalty, "stake unlocked");
        Ok(penalty)
    }
}

/// Take `amount`'s share out of the penalty base; the penalty is due only
/// while the lockup is running
fn pop_unlock_penalty(lockup: &mut Lockup, amount: u128, now: Timestamp) -> u128 {
    let locked = lockup.locked_stake;
    let base = &mut lockup.penalty_base;
    let extra_share = mul_div(base.lockup_extra, amount, locked);
    let base_share = mul_div(base.lockup_base, amount, locked);
    base.lockup_extra -= extra_share;
    base.lockup_base -= base_share;

    if now > lockup.end_time {
        return 0;
    }
    (extra_share + base_share / 2).min(amount)
}
