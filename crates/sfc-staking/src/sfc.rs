//! # SFC Facade
//!
//! Single entry point for stakers, the owner and the node driver.
//!
//! Every mutating call runs as a transaction: the ledger state is cloned,
//! the operation runs against the draft, and the draft replaces the live
//! state only if the operation returned `Ok`. A failed call leaves state
//! exactly as it was and emits no signals.
//!
//! ```text
//!   caller ──► Sfc::op ──► transact ──► Tx (draft state, snapshots, signals)
//!                              │
//!                   Ok ────────┼──► commit draft, queue signals, push snapshot
//!                   Err ───────┴──► discard
//! ```
//!
//! Time is an input: the driver passes the block timestamp to each call.

use crate::driver::{DriverAuthority, DriverSignal, DriverToken};
use crate::epoch::{SealReport, ValidatorMetrics};
use crate::gas_price::GasPriceController;
use crate::ledger::{Accounting, Ledger, Lockup, StakeRecord, Validator, WithdrawalRequest};
use crate::params::ConstantsManager;
use crate::rewards::{AccrualStrategy, AccrualVersion, Accrued, Rewards};
use crate::snapshot::{EpochSnapshot, OpenEpoch, SnapshotStore};
use crate::staking::{GenesisDelegation, GenesisValidator};
use serde::{Deserialize, Serialize};
use sfc_core::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Position in the seal cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SealPhase {
    /// Epoch open, waiting for `seal_epoch`
    #[default]
    Accumulating,
    /// Epoch sealed, waiting for the next validator set
    AwaitingValidators,
}

/// Everything except the snapshot history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Account allowed to run owner operations
    pub owner: Address,

    /// Accrual scheme in force
    pub accrual: AccrualVersion,

    /// Economic parameters
    pub constants: ConstantsManager,

    /// Sealed/current epoch counter
    pub clock: EpochClock,

    /// Seal cycle position
    pub phase: SealPhase,

    /// Validator set of the epoch being accumulated
    pub open_epoch: OpenEpoch,

    /// Minimum gas price
    pub gas: GasPriceController,

    /// Validators, stakes and balances
    pub ledger: Ledger,
}

impl LedgerState {
    pub fn strategy(&self) -> &'static dyn AccrualStrategy {
        self.accrual.strategy()
    }

    /// Last epoch a validator's stakers are paid for
    pub fn highest_payable_epoch(&self, validator_id: ValidatorId) -> Result<Epoch> {
        let validator = self.ledger.validator(validator_id)?;
        let sealed = self.clock.current_sealed_epoch();
        if validator.is_deactivated() {
            Ok(sealed.min(validator.deactivated_epoch))
        } else {
            Ok(sealed)
        }
    }

    /// Rewards accrued by a record since its markers, not yet stashed
    pub fn accrue(
        &self,
        snapshots: &SnapshotStore,
        staker: &Address,
        validator_id: ValidatorId,
    ) -> Result<Accrued> {
        let payable = self.highest_payable_epoch(validator_id)?;
        Ok(match self.ledger.record(staker, validator_id) {
            Some(record) => self.strategy().accrue(
                record,
                validator_id,
                payable,
                snapshots,
                &self.constants.reward_scaling(),
            ),
            None => Accrued::default(),
        })
    }

    /// Withdrawal penalty for stake on a doublesign-slashed validator
    pub fn slashing_penalty(&self, validator_id: ValidatorId, amount: u128) -> u128 {
        if !self.is_slashed(validator_id) {
            return 0;
        }
        let refund = self.slashing_refund_ratio(validator_id);
        if refund >= UNIT {
            return 0;
        }
        // +1 so rounding never leaves a slashed staker better off
        decimal::apply_ratio(amount, UNIT - refund)
            .saturating_add(1)
            .min(amount)
    }

    pub fn is_slashed(&self, validator_id: ValidatorId) -> bool {
        self.ledger
            .validators
            .get(&validator_id)
            .map(|v| v.status.is_cheater())
            .unwrap_or(false)
    }

    pub fn slashing_refund_ratio(&self, validator_id: ValidatorId) -> u128 {
        self.ledger
            .slashing_refund_ratio
            .get(&validator_id)
            .copied()
            .unwrap_or(0)
    }
}

/// Parameters for a fresh ledger
#[derive(Clone, Debug)]
pub struct SfcConfig {
    pub owner: Address,
    pub accrual: AccrualVersion,
    pub constants: ConstantsManager,
    /// End time of the genesis anchor snapshot
    pub genesis_time: Timestamp,
}

impl Default for SfcConfig {
    fn default() -> Self {
        Self {
            owner: Address::ZERO,
            accrual: AccrualVersion::default(),
            constants: ConstantsManager::default(),
            genesis_time: 0,
        }
    }
}

/// Signals raised inside one transaction
#[derive(Debug, Default)]
pub(crate) struct TxSignals {
    /// Last weight per validator
    weights: BTreeMap<ValidatorId, u128>,
    min_gas_price: Option<u128>,
}

impl TxSignals {
    pub(crate) fn weight(&mut self, validator_id: ValidatorId, weight: u128) {
        self.weights.insert(validator_id, weight);
    }

    pub(crate) fn min_gas_price(&mut self, price: u128) {
        self.min_gas_price = Some(price);
    }

    fn flush_into(self, queue: &mut Vec<DriverSignal>) {
        queue.extend(
            self.weights
                .into_iter()
                .map(|(validator_id, weight)| DriverSignal::ValidatorWeight {
                    validator_id,
                    weight,
                }),
        );
        if let Some(price) = self.min_gas_price {
            queue.push(DriverSignal::MinGasPrice(price));
        }
    }
}

/// Draft state handed to an operation
pub(crate) struct Tx<'a> {
    pub(crate) state: &'a mut LedgerState,
    pub(crate) snapshots: &'a SnapshotStore,
    pub(crate) signals: &'a mut TxSignals,
    pub(crate) now: Timestamp,
    /// Snapshot produced by a seal, appended on commit
    pub(crate) sealed: Option<EpochSnapshot>,
}

impl Tx<'_> {
    pub(crate) fn constants(&self) -> &ConstantsManager {
        &self.state.constants
    }

    pub(crate) fn strategy(&self) -> &'static dyn AccrualStrategy {
        self.state.strategy()
    }

    pub(crate) fn current_epoch(&self) -> Epoch {
        self.state.clock.current_epoch()
    }

    /// Queue the validator's current weight for the driver
    pub(crate) fn sync_validator(&mut self, validator_id: ValidatorId) -> Result<()> {
        let weight = self.state.ledger.validator(validator_id)?.weight();
        self.signals.weight(validator_id, weight);
        Ok(())
    }

    /// Move accrued rewards into the stash and advance the markers.
    /// Returns whether anything was added.
    pub(crate) fn stash_rewards_of(
        &mut self,
        staker: Address,
        validator_id: ValidatorId,
    ) -> Result<bool> {
        let payable = self.state.highest_payable_epoch(validator_id)?;
        let accrued = self.state.accrue(self.snapshots, &staker, validator_id)?;
        let strategy = self.strategy();
        let now = self.now;

        let record = self.state.ledger.record_mut(staker, validator_id);
        record.stash += accrued.unlocked;
        for (id, earned) in &accrued.per_lockup {
            if let Some(lockup) = record.lockups.get_mut(id) {
                lockup.stash += *earned;
                lockup.penalty_base += *earned;
            }
        }

        record.stashed_until = record.stashed_until.max(payable);
        for lockup in record.lockups.values_mut() {
            lockup.stashed_until = lockup.stashed_until.max(payable);
        }

        if strategy.releases_expired() {
            let expired: Vec<LockupId> = record
                .lockups
                .values()
                .filter(|l| l.locked_stake != 0 && !l.is_active(now))
                .map(|l| l.id)
                .collect();
            for id in expired {
                record.close_lockup(id);
            }
        }

        Ok(!accrued.total().is_zero())
    }
}

/// Staking contract state machine
pub struct Sfc {
    state: LedgerState,
    snapshots: SnapshotStore,
    authority: Box<dyn DriverAuthority>,
    signals: Vec<DriverSignal>,
}

impl Sfc {
    /// Fresh ledger at genesis
    pub fn new(config: SfcConfig, authority: Box<dyn DriverAuthority>) -> Self {
        let gas = GasPriceController::new(config.constants.params().initial_min_gas_price);
        Self {
            state: LedgerState {
                owner: config.owner,
                accrual: config.accrual,
                constants: config.constants,
                clock: EpochClock::new(),
                phase: SealPhase::Accumulating,
                open_epoch: OpenEpoch::default(),
                gas,
                ledger: Ledger::default(),
            },
            snapshots: SnapshotStore::new(config.genesis_time),
            authority,
            signals: Vec::new(),
        }
    }

    /// Ledger rebuilt from persisted parts
    pub fn restore(
        state: LedgerState,
        snapshots: SnapshotStore,
        authority: Box<dyn DriverAuthority>,
    ) -> Result<Self> {
        let sealed = state.clock.current_sealed_epoch();
        if snapshots.latest_epoch() != sealed {
            return Err(SfcError::Internal(format!(
                "ledger sealed through epoch {} but snapshots end at {}",
                sealed,
                snapshots.latest_epoch()
            )));
        }
        Ok(Self {
            state,
            snapshots,
            authority,
            signals: Vec::new(),
        })
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Signals raised since the last drain, in commit order
    pub fn drain_signals(&mut self) -> Vec<DriverSignal> {
        std::mem::take(&mut self.signals)
    }

    fn transact<T>(
        &mut self,
        now: Timestamp,
        op: impl FnOnce(&mut Tx<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut draft = self.state.clone();
        let mut signals = TxSignals::default();
        let (out, sealed) = {
            let mut tx = Tx {
                state: &mut draft,
                snapshots: &self.snapshots,
                signals: &mut signals,
                now,
                sealed: None,
            };
            let out = op(&mut tx)?;
            (out, tx.sealed)
        };
        self.state = draft;
        if let Some(snapshot) = sealed {
            self.snapshots.push(snapshot);
        }
        signals.flush_into(&mut self.signals);
        Ok(out)
    }

    fn require_owner(&self, caller: &Address) -> Result<()> {
        if *caller != self.state.owner {
            return Err(SfcError::NotOwner);
        }
        Ok(())
    }

    // === Staking ===

    /// Register `caller` as a validator with `amount` self-stake
    pub fn create_validator(
        &mut self,
        caller: Address,
        pubkey: Vec<u8>,
        amount: u128,
        now: Timestamp,
    ) -> Result<ValidatorId> {
        self.transact(now, |tx| tx.create_validator(caller, pubkey, amount))
    }

    pub fn delegate(
        &mut self,
        caller: Address,
        validator_id: ValidatorId,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        self.transact(now, |tx| tx.delegate(caller, validator_id, amount))
    }

    /// Move unlocked stake into withdrawal request `wr_id`
    pub fn undelegate(
        &mut self,
        caller: Address,
        validator_id: ValidatorId,
        wr_id: WithdrawalRequestId,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        self.transact(now, |tx| tx.undelegate(caller, validator_id, wr_id, amount))
    }

    /// Pay out a matured withdrawal request; returns the amount paid
    pub fn withdraw(
        &mut self,
        caller: Address,
        validator_id: ValidatorId,
        wr_id: WithdrawalRequestId,
        now: Timestamp,
    ) -> Result<u128> {
        self.transact(now, |tx| tx.withdraw(caller, validator_id, wr_id))
    }

    // === Lockups ===

    pub fn lock_stake(
        &mut self,
        caller: Address,
        validator_id: ValidatorId,
        duration: u64,
        amount: u128,
        now: Timestamp,
    ) -> Result<LockupId> {
        self.transact(now, |tx| tx.lock_stake(caller, validator_id, duration, amount))
    }

    pub fn relock_stake(
        &mut self,
        caller: Address,
        validator_id: ValidatorId,
        lock_id: LockupId,
        duration: u64,
        amount: u128,
        now: Timestamp,
    ) -> Result<()> {
        self.transact(now, |tx| {
            tx.relock_stake(caller, validator_id, lock_id, duration, amount)
        })
    }

    /// Release locked stake; returns the penalty burned
    pub fn unlock_stake(
        &mut self,
        caller: Address,
        validator_id: ValidatorId,
        lock_id: LockupId,
        amount: u128,
        now: Timestamp,
    ) -> Result<u128> {
        self.transact(now, |tx| tx.unlock_stake(caller, validator_id, lock_id, amount))
    }

    // === Rewards ===

    /// Pay every pending reward to the caller's balance
    pub fn claim_rewards(
        &mut self,
        caller: Address,
        validator_id: ValidatorId,
        now: Timestamp,
    ) -> Result<u128> {
        self.transact(now, |tx| tx.claim_rewards(caller, validator_id))
    }

    /// Turn pending rewards into stake. With a lockup ID, only that
    /// lockup's rewards are restaked and they stay locked in it.
    pub fn restake_rewards(
        &mut self,
        caller: Address,
        validator_id: ValidatorId,
        lock_id: Option<LockupId>,
        now: Timestamp,
    ) -> Result<u128> {
        self.transact(now, |tx| tx.restake_rewards(caller, validator_id, lock_id))
    }

    /// Compute and store `staker`'s pending rewards without paying them
    pub fn stash_rewards(
        &mut self,
        staker: Address,
        validator_id: ValidatorId,
        now: Timestamp,
    ) -> Result<()> {
        self.transact(now, |tx| {
            if !tx.stash_rewards_of(staker, validator_id)? {
                return Err(SfcError::NothingToStash);
            }
            Ok(())
        })
    }

    // === Driver ===

    pub fn seal_epoch(
        &mut self,
        token: &DriverToken,
        metrics: &[ValidatorMetrics],
        epoch_gas_used: u64,
        now: Timestamp,
    ) -> Result<SealReport> {
        self.authority.authorize(token)?;
        self.transact(now, |tx| tx.seal_epoch(metrics, epoch_gas_used))
    }

    pub fn seal_epoch_validators(
        &mut self,
        token: &DriverToken,
        validator_ids: &[ValidatorId],
        now: Timestamp,
    ) -> Result<()> {
        self.authority.authorize(token)?;
        self.transact(now, |tx| tx.seal_epoch_validators(validator_ids))
    }

    pub fn deactivate_validator(
        &mut self,
        token: &DriverToken,
        validator_id: ValidatorId,
        status_bits: u64,
        now: Timestamp,
    ) -> Result<()> {
        self.authority.authorize(token)?;
        self.transact(now, |tx| tx.deactivate_validator(validator_id, status_bits))
    }

    pub fn set_genesis_validator(
        &mut self,
        token: &DriverToken,
        genesis: GenesisValidator,
        now: Timestamp,
    ) -> Result<()> {
        self.authority.authorize(token)?;
        self.transact(now, |tx| tx.set_genesis_validator(genesis))
    }

    pub fn set_genesis_delegation(
        &mut self,
        token: &DriverToken,
        genesis: GenesisDelegation,
        now: Timestamp,
    ) -> Result<()> {
        self.authority.authorize(token)?;
        self.transact(now, |tx| tx.set_genesis_delegation(genesis))
    }

    // === Owner ===

    pub fn update_slashing_refund_ratio(
        &mut self,
        caller: Address,
        validator_id: ValidatorId,
        ratio: u128,
        now: Timestamp,
    ) -> Result<()> {
        self.require_owner(&caller)?;
        self.transact(now, |tx| tx.update_slashing_refund_ratio(validator_id, ratio))
    }

    /// Change economic parameters through the bounds-checked setters
    pub fn update_constants(
        &mut self,
        caller: Address,
        update: impl FnOnce(&mut ConstantsManager) -> Result<()>,
    ) -> Result<()> {
        self.require_owner(&caller)?;
        let mut constants = self.state.constants.clone();
        update(&mut constants)?;
        debug!(checked = constants.is_checked(), "constants updated");
        self.state.constants = constants;
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> Result<()> {
        self.require_owner(&caller)?;
        if new_owner.is_zero() {
            return Err(SfcError::InvalidAddress(new_owner.to_string()));
        }
        self.state.owner = new_owner;
        Ok(())
    }

    // === Reads ===

    pub fn owner(&self) -> Address {
        self.state.owner
    }

    pub fn accrual_version(&self) -> AccrualVersion {
        self.state.accrual
    }

    pub fn constants(&self) -> &ConstantsManager {
        &self.state.constants
    }

    pub fn current_epoch(&self) -> Epoch {
        self.state.clock.current_epoch()
    }

    pub fn current_sealed_epoch(&self) -> Epoch {
        self.state.clock.current_sealed_epoch()
    }

    pub fn phase(&self) -> SealPhase {
        self.state.phase
    }

    /// Validator set of the epoch being accumulated
    pub fn open_epoch(&self) -> &OpenEpoch {
        &self.state.open_epoch
    }

    pub fn min_gas_price(&self) -> u128 {
        self.state.gas.min_gas_price()
    }

    pub fn validator(&self, validator_id: ValidatorId) -> Result<&Validator> {
        self.state.ledger.validator(validator_id)
    }

    pub fn validator_id_of(&self, auth: &Address) -> Option<ValidatorId> {
        self.state.ledger.validator_id_of(auth)
    }

    pub fn last_validator_id(&self) -> ValidatorId {
        self.state.ledger.last_validator_id
    }

    pub fn self_stake(&self, validator_id: ValidatorId) -> u128 {
        self.state.ledger.self_stake(validator_id)
    }

    pub fn stake_of(&self, staker: &Address, validator_id: ValidatorId) -> u128 {
        self.state.ledger.stake_of(staker, validator_id)
    }

    pub fn stake_record(&self, staker: &Address, validator_id: ValidatorId) -> Option<&StakeRecord> {
        self.state.ledger.record(staker, validator_id)
    }

    pub fn locked_stake(&self, staker: &Address, validator_id: ValidatorId, now: Timestamp) -> u128 {
        self.stake_record(staker, validator_id)
            .map(|r| r.locked_stake(self.state.strategy(), now))
            .unwrap_or(0)
    }

    pub fn unlocked_stake(
        &self,
        staker: &Address,
        validator_id: ValidatorId,
        now: Timestamp,
    ) -> u128 {
        self.stake_record(staker, validator_id)
            .map(|r| r.unlocked_stake(self.state.strategy(), now))
            .unwrap_or(0)
    }

    pub fn lockup(
        &self,
        staker: &Address,
        validator_id: ValidatorId,
        lock_id: LockupId,
    ) -> Option<&Lockup> {
        self.stake_record(staker, validator_id)?.lockups.get(&lock_id)
    }

    /// Whether the staker holds an active lockup on the validator
    pub fn is_locked_up(&self, staker: &Address, validator_id: ValidatorId, now: Timestamp) -> bool {
        self.stake_record(staker, validator_id)
            .map(|r| r.active_lockups(now).next().is_some())
            .unwrap_or(false)
    }

    pub fn withdrawal_request(
        &self,
        staker: &Address,
        validator_id: ValidatorId,
        wr_id: WithdrawalRequestId,
    ) -> Option<&WithdrawalRequest> {
        self.stake_record(staker, validator_id)?.withdrawals.get(&wr_id)
    }

    /// Stashed rewards, not including anything accrued since
    pub fn reward_stash(&self, staker: &Address, validator_id: ValidatorId) -> Rewards {
        self.stake_record(staker, validator_id)
            .map(StakeRecord::unpaid)
            .unwrap_or_default()
    }

    /// Everything claimable now: stash plus accrual since the markers
    pub fn pending_rewards(&self, staker: &Address, validator_id: ValidatorId) -> Result<u128> {
        let accrued = self.state.accrue(&self.snapshots, staker, validator_id)?;
        Ok(self
            .reward_stash(staker, validator_id)
            .total()
            .saturating_add(accrued.total().total()))
    }

    /// Pending rewards earned by one lockup
    pub fn lockup_pending_rewards(
        &self,
        staker: &Address,
        validator_id: ValidatorId,
        lock_id: LockupId,
    ) -> Result<u128> {
        let accrued = self.state.accrue(&self.snapshots, staker, validator_id)?;
        let stashed = self
            .lockup(staker, validator_id, lock_id)
            .map(|l| l.stash)
            .unwrap_or_default();
        Ok((stashed + accrued.for_lockup(lock_id)).total())
    }

    pub fn highest_payable_epoch(&self, validator_id: ValidatorId) -> Result<Epoch> {
        self.state.highest_payable_epoch(validator_id)
    }

    pub fn is_slashed(&self, validator_id: ValidatorId) -> bool {
        self.state.is_slashed(validator_id)
    }

    pub fn slashing_refund_ratio(&self, validator_id: ValidatorId) -> u128 {
        self.state.slashing_refund_ratio(validator_id)
    }

    pub fn slashing_penalty(&self, validator_id: ValidatorId, amount: u128) -> u128 {
        self.state.slashing_penalty(validator_id, amount)
    }

    pub fn accounting(&self) -> &Accounting {
        &self.state.ledger.accounting
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.state.ledger.balance_of(account)
    }

    /// Snapshot of a sealed epoch
    pub fn epoch_snapshot(&self, epoch: Epoch) -> Option<&EpochSnapshot> {
        self.snapshots.get(epoch)
    }
}

impl std::fmt::Debug for Sfc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sfc")
            .field("sealed_epoch", &self.current_sealed_epoch())
            .field("phase", &self.state.phase)
            .field("validators", &self.state.ledger.validators.len())
            .field("pending_signals", &self.signals.len())
            .finish()
    }
}
