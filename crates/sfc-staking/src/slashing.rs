//! Validator deactivation and doublesign slashing
//!
//! Deactivation only ever raises a validator's status. Once a validator is
//! deactivated its stakers accrue nothing past the deactivation epoch, and
//! withdrawals from a doublesign-slashed validator lose `1 - refund_ratio`
//! of the amount (see [`crate::sfc::LedgerState::slashing_penalty`]).

use crate::sfc::Tx;
use sfc_core::prelude::*;
use tracing::{info, warn};

impl Tx<'_> {
    pub(crate) fn deactivate_validator(
        &mut self,
        validator_id: ValidatorId,
        status_bits: u64,
    ) -> Result<()> {
        if !ValidatorStatus::is_deactivation(status_bits) {
            return Err(SfcError::WrongStatus);
        }
        let status = ValidatorStatus(status_bits);
        let current = self.state.ledger.validator(validator_id)?.status;
        if status <= current {
            return Err(SfcError::StatusNotMoreSevere(validator_id));
        }

        self.set_deactivated(validator_id, status)?;
        self.sync_validator(validator_id)?;

        if status.is_cheater() {
            warn!(validator_id, status = status.name(), "validator slashed");
        } else {
            info!(validator_id, status = status.name(), "validator deactivated");
        }
        Ok(())
    }

    pub(crate) fn update_slashing_refund_ratio(
        &mut self,
        validator_id: ValidatorId,
        ratio: u128,
    ) -> Result<()> {
        if !self.state.is_slashed(validator_id) {
            return Err(SfcError::ValidatorNotSlashed(validator_id));
        }
        if ratio > UNIT {
            return Err(SfcError::RatioTooLarge);
        }
        self.state
            .ledger
            .slashing_refund_ratio
            .insert(validator_id, ratio);
        info!(validator_id, refund_ratio = %decimal::format_tokens(ratio), "slashing refund ratio updated");
        Ok(())
    }
}
