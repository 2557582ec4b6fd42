//! Minimum gas price controller
//!
//! After each seal the price moves toward keeping gas usage at the target
//! rate. The observed ratio is damped by a counterweight period so that a
//! short epoch cannot swing the price far:
//!
//! ```text
//!   ratio  = gas_used / (duration * target_gas_per_second + 1)
//!   damped = (duration * ratio + counterweight * 1.0) / (duration + counterweight)
//!   price  = clamp(price * clamp(damped, min_change, max_change), floor, ceiling)
//! ```

use crate::params::ConstantsManager;
use serde::{Deserialize, Serialize};
use sfc_core::prelude::*;

/// Current minimum gas price
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceController {
    /// Price in wei
    min_gas_price: u128,
}

impl GasPriceController {
    pub fn new(initial: u128) -> Self {
        Self {
            min_gas_price: initial,
        }
    }

    pub fn min_gas_price(&self) -> u128 {
        self.min_gas_price
    }

    /// Change ratio for an epoch of `duration` seconds that used `gas_used`
    pub fn change_ratio(duration: u64, gas_used: u64, constants: &ConstantsManager) -> u128 {
        let p = constants.params();
        let duration = u128::from(duration);
        let counterweight = u128::from(p.gas_price_counterweight);

        let target = duration
            .saturating_mul(u128::from(p.target_gas_per_second))
            .saturating_add(1);
        let observed = decimal::ratio(u128::from(gas_used), target);

        let damped = duration
            .saturating_mul(observed)
            .saturating_add(counterweight.saturating_mul(UNIT))
            / duration.saturating_add(counterweight).max(1);

        damped
            .max(p.gas_price_min_change_ratio)
            .min(p.gas_price_max_change_ratio)
    }

    /// Apply one epoch's usage and return the new price
    pub fn update(&mut self, duration: u64, gas_used: u64, constants: &ConstantsManager) -> u128 {
        let p = constants.params();
        let ratio = Self::change_ratio(duration, gas_used, constants);
        self.min_gas_price = decimal::apply_ratio(self.min_gas_price, ratio)
            .max(p.min_gas_price_floor)
            .min(p.min_gas_price_ceiling);
        self.min_gas_price
    }
}

impl Default for GasPriceController {
    fn default() -> Self {
        Self::new(ConstantsManager::default().params().initial_min_gas_price)
    }
}
