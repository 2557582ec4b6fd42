//! Validator creation, delegation, withdrawal and reward payout
//!
//! Stake changes keep four totals in step:
//!
//! | Total | Changed by |
//! |-------|-----------|
//! | record stake | every delegate / undelegate / penalty |
//! | validator received stake | same |
//! | total stake | same |
//! | total active stake | same, while the validator is OK; deactivation removes it |
//!
//! Rewards are always stashed before a record's stake changes so that the
//! old amount is paid for the epochs it was held.

use crate::ledger::{Lockup, Validator, WithdrawalRequest};
use crate::sfc::Tx;
use serde::{Deserialize, Serialize};
use sfc_core::prelude::*;
use tracing::{debug, info};

/// Validator installed by the driver at genesis
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub auth: Address,
    pub validator_id: ValidatorId,
    pub pubkey: Vec<u8>,
    pub status: ValidatorStatus,
    pub created_epoch: Epoch,
    pub created_time: Timestamp,
    pub deactivated_epoch: Epoch,
    pub deactivated_time: Timestamp,
}

/// Lockup carried over at genesis
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisLockup {
    pub locked_stake: u128,
    pub from_epoch: Epoch,
    pub end_time: Timestamp,
    pub duration: u64,
    /// Seeds the lockup's penalty base
    pub early_unlock_penalty: u128,
}

/// Delegation installed by the driver at genesis
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDelegation {
    pub delegator: Address,
    pub validator_id: ValidatorId,
    pub stake: u128,
    pub lockup: Option<GenesisLockup>,
    /// Unlocked rewards owed at genesis
    pub rewards: u128,
}

impl Tx<'_> {
    // === Validators ===

    pub(crate) fn create_validator(
        &mut self,
        auth: Address,
        pubkey: Vec<u8>,
        amount: u128,
    ) -> Result<ValidatorId> {
        if amount < self.constants().min_self_stake() {
            return Err(SfcError::InsufficientSelfStake);
        }
        if pubkey.is_empty() {
            return Err(SfcError::EmptyPubkey);
        }
        if self.state.ledger.validator_id_of(&auth).is_some() {
            return Err(SfcError::ValidatorExists);
        }

        let id = self.state.ledger.last_validator_id + 1;
        self.insert_validator(Validator {
            id,
            auth,
            status: ValidatorStatus::OK,
            created_epoch: self.current_epoch(),
            created_time: self.now,
            deactivated_epoch: 0,
            deactivated_time: 0,
            received_stake: 0,
            pubkey,
        });
        self.delegate(auth, id, amount)?;

        info!(validator_id = id, auth = %auth, self_stake = %decimal::format_tokens(amount), "validator created");
        Ok(id)
    }

    fn insert_validator(&mut self, validator: Validator) {
        let ledger = &mut self.state.ledger;
        ledger.last_validator_id = ledger.last_validator_id.max(validator.id);
        ledger.validator_ids.insert(validator.auth, validator.id);
        ledger.validators.insert(validator.id, validator);
    }

    /// Raise a validator's status; a deactivated validator stops counting
    /// toward active stake and its first deactivation is recorded.
    pub(crate) fn set_deactivated(
        &mut self,
        validator_id: ValidatorId,
        status: ValidatorStatus,
    ) -> Result<()> {
        let current_epoch = self.current_epoch();
        let now = self.now;
        let ledger = &mut self.state.ledger;
        let validator = ledger
            .validators
            .get_mut(&validator_id)
            .ok_or(SfcError::ValidatorNotFound(validator_id))?;

        if validator.status.is_ok() && !status.is_ok() {
            ledger.accounting.total_active_stake = ledger
                .accounting
                .total_active_stake
                .saturating_sub(validator.received_stake);
        }
        if status > validator.status {
            validator.status = status;
            if validator.deactivated_epoch == 0 {
                validator.deactivated_epoch = current_epoch;
                validator.deactivated_time = now;
            }
        }
        Ok(())
    }

    // === Delegation ===

    pub(crate) fn delegate(
        &mut self,
        staker: Address,
        validator_id: ValidatorId,
        amount: u128,
    ) -> Result<()> {
        self.raw_delegate(staker, validator_id, amount)?;
        let max_ratio = self.constants().max_delegated_ratio();
        if !self.state.ledger.delegation_within_limit(validator_id, max_ratio) {
            return Err(SfcError::DelegationsLimitExceeded);
        }
        Ok(())
    }

    /// Delegate without the delegation limit check
    fn raw_delegate(&mut self, staker: Address, validator_id: ValidatorId, amount: u128) -> Result<()> {
        let validator = self.state.ledger.validator(validator_id)?;
        if !validator.is_active() {
            return Err(SfcError::ValidatorNotActive(validator_id));
        }
        if amount == 0 {
            return Err(SfcError::ZeroAmount);
        }

        self.stash_rewards_of(staker, validator_id)?;

        let ledger = &mut self.state.ledger;
        let record = ledger.record_mut(staker, validator_id);
        record.stake = decimal::add(record.stake, amount)?;
        let validator = ledger.validator_mut(validator_id)?;
        validator.received_stake = decimal::add(validator.received_stake, amount)?;
        let active = validator.is_active();
        let accounting = &mut ledger.accounting;
        accounting.total_stake = decimal::add(accounting.total_stake, amount)?;
        if active {
            accounting.total_active_stake = decimal::add(accounting.total_active_stake, amount)?;
        }

        debug!(staker = %staker, validator_id, amount = %decimal::format_tokens(amount), "delegated");
        self.sync_validator(validator_id)
    }

    pub(crate) fn undelegate(
        &mut self,
        staker: Address,
        validator_id: ValidatorId,
        wr_id: WithdrawalRequestId,
        amount: u128,
    ) -> Result<()> {
        self.stash_rewards_of(staker, validator_id)?;
        if amount == 0 {
            return Err(SfcError::ZeroAmount);
        }

        let strategy = self.strategy();
        let now = self.now;
        let record = self.state.ledger.record_mut(staker, validator_id);
        if amount > record.unlocked_stake(strategy, now) {
            return Err(SfcError::NotEnoughUnlockedStake);
        }
        if record.withdrawals.contains_key(&wr_id) {
            return Err(SfcError::RequestExists(wr_id));
        }

        self.raw_undelegate(staker, validator_id, amount, true)?;

        let epoch = self.current_epoch();
        self.state
            .ledger
            .record_mut(staker, validator_id)
            .withdrawals
            .insert(
                wr_id,
                WithdrawalRequest {
                    epoch,
                    time: now,
                    amount,
                },
            );

        debug!(staker = %staker, validator_id, wr_id, amount = %decimal::format_tokens(amount), "undelegated");
        Ok(())
    }

    /// Remove stake from a record. With `strict`, dropping an OK
    /// validator's self-stake below the minimum fails; otherwise the
    /// validator is deactivated instead.
    pub(crate) fn raw_undelegate(
        &mut self,
        staker: Address,
        validator_id: ValidatorId,
        amount: u128,
        strict: bool,
    ) -> Result<()> {
        let ledger = &mut self.state.ledger;
        let record = ledger.record_mut(staker, validator_id);
        record.stake = decimal::sub(record.stake, amount).map_err(|_| SfcError::NotEnoughStake)?;
        let validator = ledger.validator_mut(validator_id)?;
        validator.received_stake = decimal::sub(validator.received_stake, amount)?;
        let active = validator.is_active();
        let accounting = &mut ledger.accounting;
        accounting.total_stake = decimal::sub(accounting.total_stake, amount)?;
        if active {
            accounting.total_active_stake = decimal::sub(accounting.total_active_stake, amount)?;
        }

        let self_stake = self.state.ledger.self_stake(validator_id);
        if self_stake == 0 {
            self.set_deactivated(validator_id, ValidatorStatus::WITHDRAWN)?;
        } else if active {
            if self_stake < self.constants().min_self_stake() {
                if strict {
                    return Err(SfcError::InsufficientSelfStake);
                }
                self.set_deactivated(validator_id, ValidatorStatus::WITHDRAWN)?;
            }
            let max_ratio = self.constants().max_delegated_ratio();
            let still_active = self.state.ledger.validator(validator_id)?.is_active();
            if still_active && !self.state.ledger.delegation_within_limit(validator_id, max_ratio) {
                return Err(SfcError::DelegationsLimitExceeded);
            }
        }

        self.sync_validator(validator_id)
    }

    pub(crate) fn withdraw(
        &mut self,
        staker: Address,
        validator_id: ValidatorId,
        wr_id: WithdrawalRequestId,
    ) -> Result<u128> {
        let validator = self.state.ledger.validator(validator_id)?.clone();
        let request = self
            .state
            .ledger
            .record(&staker, validator_id)
            .and_then(|r| r.withdrawals.get(&wr_id))
            .cloned()
            .ok_or(SfcError::RequestNotFound(wr_id))?;

        let (mut request_time, mut request_epoch) = (request.time, request.epoch);
        if validator.deactivated_time != 0 && validator.deactivated_time < request_time {
            request_time = validator.deactivated_time;
            request_epoch = validator.deactivated_epoch;
        }

        let constants = self.constants();
        if self.now < request_time.saturating_add(constants.withdrawal_period_time()) {
            return Err(SfcError::NotEnoughTimePassed);
        }
        if self.current_epoch() < request_epoch.saturating_add(constants.withdrawal_period_epochs()) {
            return Err(SfcError::NotEnoughEpochsPassed);
        }

        let penalty = self.state.slashing_penalty(validator_id, request.amount);
        let ledger = &mut self.state.ledger;
        ledger.record_mut(staker, validator_id).withdrawals.remove(&wr_id);
        ledger.accounting.total_slashed_stake =
            decimal::add(ledger.accounting.total_slashed_stake, penalty)?;
        if request.amount <= penalty {
            return Err(SfcError::FullySlashed);
        }

        let paid = request.amount - penalty;
        ledger.credit(staker, paid)?;
        ledger.accounting.total_withdrawn = decimal::add(ledger.accounting.total_withdrawn, paid)?;

        debug!(staker = %staker, validator_id, wr_id, paid = %decimal::format_tokens(paid), penalty = %penalty, "withdrawn");
        Ok(paid)
    }

    // === Rewards ===

    pub(crate) fn claim_rewards(&mut self, staker: Address, validator_id: ValidatorId) -> Result<u128> {
        self.stash_rewards_of(staker, validator_id)?;
        let ledger = &mut self.state.ledger;
        let rewards = ledger.record_mut(staker, validator_id).take_unpaid();
        let total = rewards.total();
        if total == 0 {
            return Err(SfcError::ZeroRewards);
        }
        ledger.credit(staker, total)?;
        ledger.accounting.total_rewards_paid = decimal::add(ledger.accounting.total_rewards_paid, total)?;

        debug!(staker = %staker, validator_id, amount = %total, "rewards claimed");
        Ok(total)
    }

    pub(crate) fn restake_rewards(
        &mut self,
        staker: Address,
        validator_id: ValidatorId,
        lock_id: Option<LockupId>,
    ) -> Result<u128> {
        self.stash_rewards_of(staker, validator_id)?;
        let now = self.now;
        let record = self.state.ledger.record_mut(staker, validator_id);

        let amount = match lock_id {
            Some(id) => {
                let lockup = record
                    .lockups
                    .get_mut(&id)
                    .filter(|l| l.is_active(now))
                    .ok_or(SfcError::NotLockedUp)?;
                std::mem::take(&mut lockup.stash).total()
            }
            None => record.take_unpaid().total(),
        };
        if amount == 0 {
            return Err(SfcError::ZeroRewards);
        }

        self.delegate(staker, validator_id, amount)?;
        if let Some(id) = lock_id {
            let lockup = self
                .state
                .ledger
                .record_mut(staker, validator_id)
                .lockups
                .get_mut(&id)
                .ok_or(SfcError::NotLockedUp)?;
            lockup.locked_stake = decimal::add(lockup.locked_stake, amount)?;
        }
        let accounting = &mut self.state.ledger.accounting;
        accounting.total_rewards_paid = decimal::add(accounting.total_rewards_paid, amount)?;

        debug!(staker = %staker, validator_id, ?lock_id, amount = %amount, "rewards restaked");
        Ok(amount)
    }

    // === Genesis ===

    pub(crate) fn set_genesis_validator(&mut self, genesis: GenesisValidator) -> Result<()> {
        let ledger = &self.state.ledger;
        if genesis.validator_id == 0
            || ledger.validators.contains_key(&genesis.validator_id)
            || ledger.validator_id_of(&genesis.auth).is_some()
        {
            return Err(SfcError::ValidatorExists);
        }
        if genesis.pubkey.is_empty() {
            return Err(SfcError::EmptyPubkey);
        }

        let id = genesis.validator_id;
        self.insert_validator(Validator {
            id,
            auth: genesis.auth,
            status: genesis.status,
            created_epoch: genesis.created_epoch,
            created_time: genesis.created_time,
            deactivated_epoch: genesis.deactivated_epoch,
            deactivated_time: genesis.deactivated_time,
            received_stake: 0,
            pubkey: genesis.pubkey,
        });
        info!(validator_id = id, auth = %genesis.auth, status = genesis.status.name(), "genesis validator");
        self.sync_validator(id)
    }

    pub(crate) fn set_genesis_delegation(&mut self, genesis: GenesisDelegation) -> Result<()> {
        let GenesisDelegation {
            delegator,
            validator_id,
            stake,
            lockup,
            rewards,
        } = genesis;

        self.raw_delegate(delegator, validator_id, stake)?;

        let record = self.state.ledger.record_mut(delegator, validator_id);
        record.stash.unlocked = rewards;

        if let Some(lock) = lockup.filter(|l| l.locked_stake != 0) {
            if lock.locked_stake > stake {
                return Err(SfcError::LockedExceedsStake);
            }
            let id = record.allocate_lockup_id();
            let mut lockup = Lockup {
                id,
                locked_stake: lock.locked_stake,
                from_epoch: lock.from_epoch,
                start_time: lock.end_time.saturating_sub(lock.duration),
                end_time: lock.end_time,
                duration: lock.duration,
                stashed_until: record.stashed_until,
                ..Default::default()
            };
            lockup.penalty_base.lockup_extra = lock.early_unlock_penalty;
            record.lockups.insert(id, lockup);
        }

        debug!(delegator = %delegator, validator_id, stake = %decimal::format_tokens(stake), "genesis delegation");
        Ok(())
    }
}
