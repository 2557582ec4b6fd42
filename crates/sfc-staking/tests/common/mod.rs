//! Shared fixture: a small network with a driver, a clock and named accounts

#![allow(dead_code)]

use sfc_core::prelude::*;
use sfc_staking::{
    AccrualVersion, ConstantsManager, DriverToken, EconomicParams, NodeDriverAuth, SealReport, Sfc,
    SfcConfig, ValidatorMetrics,
};

pub const DAY: u64 = 86_400;

/// Whole tokens to base units
pub fn tokens(n: u128) -> u128 {
    n * UNIT
}

/// Decimal token string to base units
pub fn amount(s: &str) -> u128 {
    decimal::parse_tokens(s).unwrap()
}

pub fn account(name: &str) -> Address {
    Address::derive(name)
}

pub struct Net {
    pub sfc: Sfc,
    pub token: DriverToken,
    pub owner: Address,
    pub now: Timestamp,
}

impl Net {
    /// Test-network constants, base reward of 1 token per second
    pub fn new(accrual: AccrualVersion) -> Self {
        let (auth, token) = NodeDriverAuth::issue();
        let owner = account("owner");
        let config = SfcConfig {
            owner,
            accrual,
            constants: ConstantsManager::unchecked(EconomicParams::testing()),
            genesis_time: 0,
        };
        let mut net = Self {
            sfc: Sfc::new(config, Box::new(auth)),
            token,
            owner,
            now: 0,
        };
        net.set_base_reward_per_second(UNIT);
        net
    }

    pub fn set_base_reward_per_second(&mut self, value: u128) {
        let owner = self.owner;
        self.sfc
            .update_constants(owner, |c| c.update_base_reward_per_second(value))
            .unwrap();
    }

    pub fn advance(&mut self, secs: u64) {
        self.now += secs;
    }

    pub fn create_validator(&mut self, name: &str, stake: u128) -> (Address, ValidatorId) {
        let auth = account(name);
        let id = self
            .sfc
            .create_validator(auth, vec![0xc0, 0x04], stake, self.now)
            .unwrap();
        (auth, id)
    }

    pub fn delegate(&mut self, name: &str, validator_id: ValidatorId, stake: u128) -> Address {
        let staker = account(name);
        self.sfc.delegate(staker, validator_id, stake, self.now).unwrap();
        staker
    }

    /// Advance `secs`, seal with every validator fully online, then open
    /// the next epoch with all validators
    pub fn seal(&mut self, secs: u64) -> SealReport {
        let metrics: Vec<ValidatorMetrics> = self
            .sfc
            .open_epoch()
            .validator_ids
            .iter()
            .map(|id| ValidatorMetrics::online(*id, secs))
            .collect();
        self.seal_with(secs, &metrics)
    }

    pub fn seal_with(&mut self, secs: u64, metrics: &[ValidatorMetrics]) -> SealReport {
        self.advance(secs);
        let report = self.sfc.seal_epoch(&self.token, metrics, 0, self.now).unwrap();
        let ids: Vec<ValidatorId> = (1..=self.sfc.last_validator_id()).collect();
        self.sfc
            .seal_epoch_validators(&self.token, &ids, self.now)
            .unwrap();
        report
    }

    pub fn pending(&self, staker: &Address, validator_id: ValidatorId) -> u128 {
        self.sfc.pending_rewards(staker, validator_id).unwrap()
    }
}

/// Three validators (10, 5 and 1 tokens); the third locks its own token
/// for 364 days. Two epochs sealed.
pub fn three_validators(accrual: AccrualVersion) -> (Net, [ValidatorId; 3]) {
    let mut net = Net::new(accrual);
    let (_, v1) = net.create_validator("validator-1", tokens(10));
    let (_, v2) = net.create_validator("validator-2", tokens(5));
    let (auth3, v3) = net.create_validator("validator-3", tokens(1));
    net.seal(0);
    net.sfc
        .lock_stake(auth3, v3, 364 * DAY, tokens(1), net.now)
        .unwrap();
    net.seal(0);
    (net, [v1, v2, v3])
}
