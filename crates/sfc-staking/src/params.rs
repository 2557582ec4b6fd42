//! # Constants Manager
//!
//! Tunable economic parameters read by every ledger formula.
//!
//! | Parameter | Mainnet | Bounds |
//! |-----------|---------|--------|
//! | min self-stake | 317,500 tokens | 100,000 .. 10,000,000 |
//! | max delegated ratio | 16x | 1x .. 31x |
//! | validator commission | 15% | <= 50% |
//! | burnt / treasury fee share | 20% / 10% | <= 50% each, sum <= 100% |
//! | unlocked reward ratio | 30% | 5% .. 50% |
//! | lockup duration | 14 .. 365 days | min 1 .. 1000 days, max 30 .. 1460 days |
//! | withdrawal period | 7 days, 3 epochs | 1 .. 30 days, 2 .. 100 epochs |
//! | base reward per second | 2.6686 tokens | 0.5 .. 32 tokens |
//! | offline threshold | 5 days, 1000 blocks | 1 .. 10 days, 100 .. 1,000,000 blocks |
//! | target gas per second | 2,000,000 | 1,000,000 .. 500,000,000 |
//! | gas price counterweight | 3600 s | 100 s .. 10 days |
//!
//! Setters enforce the bounds above. A manager built with
//! [`ConstantsManager::unchecked`] skips them, which is how test networks
//! run with tiny stakes and short lockups.

use serde::{Deserialize, Serialize};
use sfc_core::decimal::{as_tokens, as_wei, UNIT};
use sfc_core::{Result, SfcError};

const DAY: u64 = 24 * 60 * 60;
const GWEI: u128 = 1_000_000_000;

/// Raw parameter values
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomicParams {
    /// Minimum self-stake to create or keep an active validator
    #[serde(with = "as_tokens")]
    pub min_self_stake: u128,

    /// Max received stake as a multiple of self-stake (ratio of UNIT)
    #[serde(with = "as_tokens")]
    pub max_delegated_ratio: u128,

    /// Share of raw validator reward kept by the validator
    #[serde(with = "as_tokens")]
    pub validator_commission: u128,

    /// Share of epoch fees burnt
    #[serde(with = "as_tokens")]
    pub burnt_fee_share: u128,

    /// Share of epoch fees sent to the treasury
    #[serde(with = "as_tokens")]
    pub treasury_fee_share: u128,

    /// Reward ratio paid on stake that is not locked
    #[serde(with = "as_tokens")]
    pub unlocked_reward_ratio: u128,

    /// Shortest lockup in seconds
    pub min_lockup_duration: u64,

    /// Longest lockup in seconds
    pub max_lockup_duration: u64,

    /// Epochs a withdrawal request must wait
    pub withdrawal_period_epochs: u64,

    /// Seconds a withdrawal request must wait
    pub withdrawal_period_time: u64,

    /// Base reward minted per second of epoch duration
    #[serde(with = "as_tokens")]
    pub base_reward_per_second: u128,

    /// Offline time at which a validator is deactivated
    pub offline_penalty_threshold_time: u64,

    /// Missed blocks above which a validator is deactivated
    pub offline_penalty_threshold_blocks: u64,

    /// Gas per second the price controller steers toward
    pub target_gas_per_second: u64,

    /// Damping period of the price controller in seconds
    pub gas_price_counterweight: u64,

    /// Lower clamp on the per-epoch price change ratio
    #[serde(with = "as_tokens")]
    pub gas_price_min_change_ratio: u128,

    /// Upper clamp on the per-epoch price change ratio
    #[serde(with = "as_tokens")]
    pub gas_price_max_change_ratio: u128,

    /// Price floor in wei
    #[serde(with = "as_wei")]
    pub min_gas_price_floor: u128,

    /// Price ceiling in wei
    #[serde(with = "as_wei")]
    pub min_gas_price_ceiling: u128,

    /// Price at genesis in wei
    #[serde(with = "as_wei")]
    pub initial_min_gas_price: u128,
}

impl EconomicParams {
    /// Production values
    pub fn mainnet() -> Self {
        Self {
            min_self_stake: 317_500 * UNIT,
            max_delegated_ratio: 16 * UNIT,
            validator_commission: UNIT * 15 / 100,
            burnt_fee_share: UNIT * 20 / 100,
            treasury_fee_share: UNIT * 10 / 100,
            unlocked_reward_ratio: UNIT * 30 / 100,
            min_lockup_duration: 14 * DAY,
            max_lockup_duration: 365 * DAY,
            withdrawal_period_epochs: 3,
            withdrawal_period_time: 7 * DAY,
            base_reward_per_second: 2_668_658_453_701_531_600,
            offline_penalty_threshold_time: 5 * DAY,
            offline_penalty_threshold_blocks: 1000,
            target_gas_per_second: 2_000_000,
            gas_price_counterweight: 3600,
            gas_price_min_change_ratio: UNIT * 95 / 100,
            gas_price_max_change_ratio: UNIT * 105 / 100,
            min_gas_price_floor: GWEI,
            min_gas_price_ceiling: 1_000_000 * GWEI,
            initial_min_gas_price: 100 * GWEI,
        }
    }

    /// Test network values: same ratios, tiny stake floor
    pub fn testing() -> Self {
        Self {
            min_self_stake: UNIT * 3175 / 10_000,
            ..Self::mainnet()
        }
    }
}

impl Default for EconomicParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Reward-scaling inputs used by the accrual engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewardScaling {
    pub unlocked_reward_ratio: u128,
    pub max_lockup_duration: u64,
}

/// Bounds-checked parameter store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantsManager {
    params: EconomicParams,
    /// When false, setters skip range checks
    checked: bool,
}

fn too_small(parameter: &'static str) -> SfcError {
    SfcError::ParameterOutOfBounds {
        parameter,
        reason: "too small value",
    }
}

fn too_large(parameter: &'static str) -> SfcError {
    SfcError::ParameterOutOfBounds {
        parameter,
        reason: "too large value",
    }
}

macro_rules! bounded_setter {
    ($(#[$doc:meta])* $setter:ident, $field:ident, $ty:ty, $min:expr, $max:expr) => {
        $(#[$doc])*
        pub fn $setter(&mut self, value: $ty) -> Result<()> {
            if self.checked {
                if value < $min {
                    return Err(too_small(stringify!($field)));
                }
                if value > $max {
                    return Err(too_large(stringify!($field)));
                }
            }
            self.params.$field = value;
            Ok(())
        }
    };
}

impl ConstantsManager {
    /// Build from `params`, validating every value through the setters
    pub fn new(params: EconomicParams) -> Result<Self> {
        let mut manager = Self {
            params: EconomicParams::mainnet(),
            checked: true,
        };
        manager.apply(&params)?;
        Ok(manager)
    }

    /// Build without range checks
    pub fn unchecked(params: EconomicParams) -> Self {
        Self {
            params,
            checked: false,
        }
    }

    /// Whether setters enforce bounds
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// Current values
    pub fn params(&self) -> &EconomicParams {
        &self.params
    }

    /// Replace every value, validating each
    pub fn apply(&mut self, p: &EconomicParams) -> Result<()> {
        self.update_min_self_stake(p.min_self_stake)?;
        self.update_max_delegated_ratio(p.max_delegated_ratio)?;
        self.update_validator_commission(p.validator_commission)?;
        self.update_burnt_fee_share(p.burnt_fee_share)?;
        self.update_treasury_fee_share(p.treasury_fee_share)?;
        self.update_unlocked_reward_ratio(p.unlocked_reward_ratio)?;
        // min before max so the ordering check sees the new floor
        self.update_min_lockup_duration(p.min_lockup_duration)?;
        self.update_max_lockup_duration(p.max_lockup_duration)?;
        self.update_withdrawal_period_epochs(p.withdrawal_period_epochs)?;
        self.update_withdrawal_period_time(p.withdrawal_period_time)?;
        self.update_base_reward_per_second(p.base_reward_per_second)?;
        self.update_offline_penalty_threshold_time(p.offline_penalty_threshold_time)?;
        self.update_offline_penalty_threshold_blocks(p.offline_penalty_threshold_blocks)?;
        self.update_target_gas_per_second(p.target_gas_per_second)?;
        self.update_gas_price_counterweight(p.gas_price_counterweight)?;
        self.update_gas_price_change_ratios(
            p.gas_price_min_change_ratio,
            p.gas_price_max_change_ratio,
        )?;
        self.update_gas_price_bounds(p.min_gas_price_floor, p.min_gas_price_ceiling)?;
        self.update_initial_min_gas_price(p.initial_min_gas_price)?;
        Ok(())
    }

    bounded_setter!(
        /// Minimum validator self-stake
        update_min_self_stake, min_self_stake, u128, 100_000 * UNIT, 10_000_000 * UNIT
    );
    bounded_setter!(
        /// Max delegated ratio
        update_max_delegated_ratio, max_delegated_ratio, u128, UNIT, 31 * UNIT
    );
    bounded_setter!(
        /// Unlocked reward ratio
        update_unlocked_reward_ratio, unlocked_reward_ratio, u128, UNIT * 5 / 100, UNIT / 2
    );
    bounded_setter!(
        update_min_lockup_duration, min_lockup_duration, u64, DAY, 1000 * DAY
    );
    bounded_setter!(
        update_withdrawal_period_epochs, withdrawal_period_epochs, u64, 2, 100
    );
    bounded_setter!(
        update_withdrawal_period_time, withdrawal_period_time, u64, DAY, 30 * DAY
    );
    bounded_setter!(
        /// Base reward per second
        update_base_reward_per_second, base_reward_per_second, u128, UNIT / 2, 32 * UNIT
    );
    bounded_setter!(
        update_offline_penalty_threshold_time, offline_penalty_threshold_time, u64, DAY, 10 * DAY
    );
    bounded_setter!(
        update_offline_penalty_threshold_blocks, offline_penalty_threshold_blocks, u64, 100, 1_000_000
    );
    bounded_setter!(
        update_target_gas_per_second, target_gas_per_second, u64, 1_000_000, 500_000_000
    );
    bounded_setter!(
        update_gas_price_counterweight, gas_price_counterweight, u64, 100, 10 * DAY
    );

    /// Validator commission
    pub fn update_validator_commission(&mut self, value: u128) -> Result<()> {
        if self.checked && value > UNIT / 2 {
            return Err(too_large("validator_commission"));
        }
        self.params.validator_commission = value;
        Ok(())
    }

    /// Burnt fee share; burnt plus treasury may not exceed 100%
    pub fn update_burnt_fee_share(&mut self, value: u128) -> Result<()> {
        if self.checked && value > UNIT / 2 {
            return Err(too_large("burnt_fee_share"));
        }
        if value.saturating_add(self.params.treasury_fee_share) > UNIT {
            return Err(too_large("burnt_fee_share"));
        }
        self.params.burnt_fee_share = value;
        Ok(())
    }

    /// Treasury fee share; burnt plus treasury may not exceed 100%
    pub fn update_treasury_fee_share(&mut self, value: u128) -> Result<()> {
        if self.checked && value > UNIT / 2 {
            return Err(too_large("treasury_fee_share"));
        }
        if value.saturating_add(self.params.burnt_fee_share) > UNIT {
            return Err(too_large("treasury_fee_share"));
        }
        self.params.treasury_fee_share = value;
        Ok(())
    }

    /// Longest lockup; never below the shortest
    pub fn update_max_lockup_duration(&mut self, value: u64) -> Result<()> {
        if self.checked {
            if value < 30 * DAY {
                return Err(too_small("max_lockup_duration"));
            }
            if value > 1460 * DAY {
                return Err(too_large("max_lockup_duration"));
            }
        }
        if value < self.params.min_lockup_duration || value == 0 {
            return Err(SfcError::ParameterOutOfBounds {
                parameter: "max_lockup_duration",
                reason: "must be greater than or equal to min_lockup_duration",
            });
        }
        self.params.max_lockup_duration = value;
        Ok(())
    }

    /// Per-epoch clamp on the gas price change ratio
    pub fn update_gas_price_change_ratios(&mut self, min: u128, max: u128) -> Result<()> {
        if min > UNIT || min == 0 {
            return Err(too_large("gas_price_min_change_ratio"));
        }
        if max < UNIT {
            return Err(too_small("gas_price_max_change_ratio"));
        }
        self.params.gas_price_min_change_ratio = min;
        self.params.gas_price_max_change_ratio = max;
        Ok(())
    }

    /// Absolute floor and ceiling of the minimum gas price
    pub fn update_gas_price_bounds(&mut self, floor: u128, ceiling: u128) -> Result<()> {
        if floor == 0 {
            return Err(too_small("min_gas_price_floor"));
        }
        if ceiling < floor {
            return Err(too_small("min_gas_price_ceiling"));
        }
        self.params.min_gas_price_floor = floor;
        self.params.min_gas_price_ceiling = ceiling;
        Ok(())
    }

    /// Minimum gas price before the first seal; must lie within the
    /// current floor and ceiling
    pub fn update_initial_min_gas_price(&mut self, value: u128) -> Result<()> {
        if value < self.params.min_gas_price_floor {
            return Err(too_small("initial_min_gas_price"));
        }
        if value > self.params.min_gas_price_ceiling {
            return Err(too_large("initial_min_gas_price"));
        }
        self.params.initial_min_gas_price = value;
        Ok(())
    }

    pub fn min_self_stake(&self) -> u128 {
        self.params.min_self_stake
    }

    pub fn max_delegated_ratio(&self) -> u128 {
        self.params.max_delegated_ratio
    }

    pub fn validator_commission(&self) -> u128 {
        self.params.validator_commission
    }

    pub fn burnt_fee_share(&self) -> u128 {
        self.params.burnt_fee_share
    }

    pub fn treasury_fee_share(&self) -> u128 {
        self.params.treasury_fee_share
    }

    pub fn unlocked_reward_ratio(&self) -> u128 {
        self.params.unlocked_reward_ratio
    }

    pub fn min_lockup_duration(&self) -> u64 {
        self.params.min_lockup_duration
    }

    pub fn max_lockup_duration(&self) -> u64 {
        self.params.max_lockup_duration
    }

    pub fn withdrawal_period_epochs(&self) -> u64 {
        self.params.withdrawal_period_epochs
    }

    pub fn withdrawal_period_time(&self) -> u64 {
        self.params.withdrawal_period_time
    }

    pub fn base_reward_per_second(&self) -> u128 {
        self.params.base_reward_per_second
    }

    pub fn offline_penalty_threshold_time(&self) -> u64 {
        self.params.offline_penalty_threshold_time
    }

    pub fn offline_penalty_threshold_blocks(&self) -> u64 {
        self.params.offline_penalty_threshold_blocks
    }

    pub fn target_gas_per_second(&self) -> u64 {
        self.params.target_gas_per_second
    }

    pub fn gas_price_counterweight(&self) -> u64 {
        self.params.gas_price_counterweight
    }

    /// Inputs to [`crate::rewards::scale_lockup_reward`]
    pub fn reward_scaling(&self) -> RewardScaling {
        RewardScaling {
            unlocked_reward_ratio: self.params.unlocked_reward_ratio,
            max_lockup_duration: self.params.max_lockup_duration,
        }
    }
}

impl Default for ConstantsManager {
    fn default() -> Self {
        Self {
            params: EconomicParams::mainnet(),
            checked: true,
        }
    }
}
