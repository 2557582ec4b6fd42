//! # Epoch Sealing
//!
//! The driver closes each epoch in two steps:
//!
//! ```text
//!   Accumulating ──seal_epoch(metrics, gas)──► AwaitingValidators
//!        ▲                                            │
//!        └──────seal_epoch_validators(next set)───────┘
//! ```
//!
//! `seal_epoch` splits the epoch's rewards across the validator set that
//! was fixed when the epoch opened. Each validator's weight is its stake at
//! epoch open scaled by uptime; the validator keeps its commission (stashed
//! right away) and the rest becomes reward-per-token for every staker on it.
//!
//! Stake that arrives mid-epoch is paid from the next seal onward, once
//! `seal_epoch_validators` has captured it.

use crate::rewards::scale_lockup_reward;
use crate::sfc::{SealPhase, Tx};
use crate::snapshot::{EpochSnapshot, OpenEpoch};
use serde::{Deserialize, Serialize};
use sfc_core::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Driver-reported figures for one validator of the closing epoch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorMetrics {
    pub validator_id: ValidatorId,
    /// Seconds offline at seal time
    pub offline_time: u64,
    /// Blocks missed at seal time
    pub offline_blocks: u64,
    /// Seconds online during the epoch
    pub uptime: u64,
    /// Fees of transactions the validator originated
    pub originated_fee: u128,
}

impl ValidatorMetrics {
    /// Fully online for `duration`, no fees
    pub fn online(validator_id: ValidatorId, duration: u64) -> Self {
        Self {
            validator_id,
            uptime: duration,
            ..Default::default()
        }
    }
}

/// Outcome of a seal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealReport {
    pub epoch: Epoch,
    pub end_time: Timestamp,
    /// Seconds covered, at least 1
    pub duration: u64,
    /// Raw rewards handed to validators, commission included
    pub total_reward: u128,
    pub epoch_fee: u128,
    pub min_gas_price: u128,
    /// Validators deactivated as offline by this seal
    pub deactivated: Vec<ValidatorId>,
}

/// Metrics in the open set's order; every validator exactly once
fn match_metrics<'m>(
    open: &OpenEpoch,
    metrics: &'m [ValidatorMetrics],
) -> Result<Vec<&'m ValidatorMetrics>> {
    let mismatch = || SfcError::MetricsMismatch {
        expected: open.validator_ids.len(),
        got: metrics.len(),
    };
    if metrics.len() != open.validator_ids.len() {
        return Err(mismatch());
    }
    let by_id: BTreeMap<ValidatorId, &ValidatorMetrics> =
        metrics.iter().map(|m| (m.validator_id, m)).collect();
    if by_id.len() != metrics.len() {
        return Err(mismatch());
    }
    open.validator_ids
        .iter()
        .map(|id| by_id.get(id).copied().ok_or_else(mismatch))
        .collect()
}

fn bump<V: Copy + Default + std::ops::Add<Output = V>>(
    map: &mut BTreeMap<ValidatorId, V>,
    id: ValidatorId,
    delta: V,
) {
    let entry = map.entry(id).or_default();
    *entry = *entry + delta;
}

impl Tx<'_> {
    pub(crate) fn seal_epoch(
        &mut self,
        metrics: &[ValidatorMetrics],
        epoch_gas_used: u64,
    ) -> Result<SealReport> {
        let epoch = self.current_epoch();
        if self.state.phase != SealPhase::Accumulating {
            return Err(SfcError::AwaitingValidators(epoch));
        }
        if self.snapshots.next_epoch() != epoch {
            return Err(SfcError::Internal(format!(
                "sealing epoch {} but snapshots expect {}",
                epoch,
                self.snapshots.next_epoch()
            )));
        }

        let open = std::mem::take(&mut self.state.open_epoch);
        let matched = match_metrics(&open, metrics)?;
        let constants = self.state.constants.clone();
        let prev = self.snapshots.latest();
        let duration = self.now.saturating_sub(prev.end_time).max(1);
        let span = u128::from(duration);

        // weights from stake at epoch open, scaled by uptime
        let mut uptimes = Vec::with_capacity(matched.len());
        let mut base_weights = Vec::with_capacity(matched.len());
        let mut tx_weights = Vec::with_capacity(matched.len());
        let mut epoch_fee = 0u128;
        for m in &matched {
            let uptime = m.uptime.min(duration);
            let stake = open.received_stake.get(&m.validator_id).copied().unwrap_or(0);
            uptimes.push(uptime);
            base_weights.push(mul_div(stake, u128::from(uptime), span));
            tx_weights.push(mul_div(m.originated_fee, u128::from(uptime), span));
            epoch_fee = epoch_fee.saturating_add(m.originated_fee);
        }
        let total_base_weight: u128 = base_weights.iter().fold(0, |a, w| a.saturating_add(*w));
        let total_tx_weight: u128 = tx_weights.iter().fold(0, |a, w| a.saturating_add(*w));

        let mut snapshot = EpochSnapshot {
            epoch,
            end_time: self.now.max(prev.end_time),
            validator_ids: open.validator_ids.clone(),
            received_stake: open.received_stake.clone(),
            accumulated_reward_per_token: prev.accumulated_reward_per_token.clone(),
            accumulated_uptime: prev.accumulated_uptime.clone(),
            accumulated_originated_fee: prev.accumulated_originated_fee.clone(),
            epoch_fee,
            total_base_reward_weight: total_base_weight,
            total_tx_reward_weight: total_tx_weight,
            base_reward_per_second: constants.base_reward_per_second(),
            total_stake: open.total_stake,
            ..Default::default()
        };

        let base_pool = span.saturating_mul(constants.base_reward_per_second());
        let fee_share_kept = UNIT
            .saturating_sub(constants.burnt_fee_share())
            .saturating_sub(constants.treasury_fee_share());
        let mut total_reward = 0u128;

        for (i, m) in matched.iter().enumerate() {
            let id = m.validator_id;
            let base_reward = mul_div(base_pool, base_weights[i], total_base_weight);
            let tx_reward = decimal::apply_ratio(
                mul_div(epoch_fee, tx_weights[i], total_tx_weight),
                fee_share_kept,
            );
            let raw = base_reward.saturating_add(tx_reward);
            let commission = decimal::apply_ratio(raw, constants.validator_commission());
            self.stash_commission(id, commission)?;

            let received = self.state.ledger.validator(id)?.received_stake;
            let reward_per_token = if received == 0 {
                0
            } else {
                mul_div(raw - commission, UNIT, received)
            };
            bump(&mut snapshot.accumulated_reward_per_token, id, reward_per_token);
            bump(&mut snapshot.accumulated_uptime, id, uptimes[i]);
            bump(&mut snapshot.accumulated_originated_fee, id, m.originated_fee);
            snapshot.offline_time.insert(id, m.offline_time);
            snapshot.offline_blocks.insert(id, m.offline_blocks);
            total_reward = total_reward.saturating_add(raw);

            debug!(validator_id = id, raw = %raw, commission = %commission, reward_per_token = %reward_per_token, "validator rewarded");
        }

        let accounting = &mut self.state.ledger.accounting;
        accounting.treasury = accounting
            .treasury
            .saturating_add(decimal::apply_ratio(epoch_fee, constants.treasury_fee_share()));
        accounting.total_burnt = accounting
            .total_burnt
            .saturating_add(decimal::apply_ratio(epoch_fee, constants.burnt_fee_share()));

        let mut deactivated = Vec::new();
        for m in &matched {
            if m.offline_blocks > constants.offline_penalty_threshold_blocks()
                && m.offline_time >= constants.offline_penalty_threshold_time()
            {
                let status = self.state.ledger.validator(m.validator_id)?.status;
                if status < ValidatorStatus::OFFLINE {
                    self.set_deactivated(m.validator_id, ValidatorStatus::OFFLINE)?;
                    self.sync_validator(m.validator_id)?;
                    deactivated.push(m.validator_id);
                    warn!(
                        validator_id = m.validator_id,
                        offline_time = m.offline_time,
                        offline_blocks = m.offline_blocks,
                        "validator offline, deactivated"
                    );
                }
            }
        }

        let min_gas_price = self.state.gas.update(duration, epoch_gas_used, &constants);
        self.signals.min_gas_price(min_gas_price);

        self.state.clock.advance();
        self.state.phase = SealPhase::AwaitingValidators;

        let report = SealReport {
            epoch,
            end_time: snapshot.end_time,
            duration,
            total_reward,
            epoch_fee,
            min_gas_price,
            deactivated,
        };
        self.sealed = Some(snapshot);

        info!(
            epoch,
            duration,
            validators = matched.len(),
            total_reward = %report.total_reward,
            min_gas_price = %min_gas_price,
            "epoch sealed"
        );
        Ok(report)
    }

    /// Stash the validator's commission on its own record, split by its
    /// active self-lockups
    fn stash_commission(&mut self, validator_id: ValidatorId, commission: u128) -> Result<()> {
        if commission == 0 {
            return Ok(());
        }
        let scaling = self.constants().reward_scaling();
        let now = self.now;
        let ledger = &mut self.state.ledger;
        let auth = ledger.validator(validator_id)?.auth;
        let self_stake = ledger.self_stake(validator_id);
        if self_stake == 0 {
            return Ok(());
        }

        let record = ledger.record_mut(auth, validator_id);
        let mut locked_portion = 0u128;
        for lockup in record.lockups.values_mut().filter(|l| l.is_active(now)) {
            let portion = mul_div(commission, lockup.locked_stake, self_stake);
            let earned = scale_lockup_reward(portion, lockup.duration, &scaling);
            lockup.stash += earned;
            lockup.penalty_base += earned;
            locked_portion = locked_portion.saturating_add(portion);
        }
        record.stash += scale_lockup_reward(commission.saturating_sub(locked_portion), 0, &scaling);
        Ok(())
    }

    pub(crate) fn seal_epoch_validators(&mut self, validator_ids: &[ValidatorId]) -> Result<()> {
        let epoch = self.current_epoch();
        let at_genesis = self.state.clock.current_sealed_epoch() == 0;
        let ready = match self.state.phase {
            SealPhase::AwaitingValidators => true,
            SealPhase::Accumulating => at_genesis,
        };
        if !ready {
            return Err(SfcError::NotAwaitingValidators(epoch));
        }

        let mut seen = BTreeSet::new();
        let mut open = OpenEpoch::default();
        for id in validator_ids.iter().copied().filter(|id| seen.insert(*id)) {
            let stake = self.state.ledger.validator(id)?.received_stake;
            open.validator_ids.push(id);
            open.received_stake.insert(id, stake);
            open.total_stake = open.total_stake.saturating_add(stake);
        }

        info!(
            epoch,
            validators = open.validator_ids.len(),
            total_stake = %decimal::format_tokens(open.total_stake),
            "epoch validator set fixed"
        );
        self.state.open_epoch = open;
        self.state.phase = SealPhase::Accumulating;
        let price = self.state.gas.min_gas_price();
        self.signals.min_gas_price(price);
        Ok(())
    }
}
