//! Genesis file for a fresh SFC ledger
//!
//! A JSON document listing the validators and delegations the driver
//! installs before the first epoch opens. Addresses are `0x` hex strings,
//! amounts are decimal token strings.
//!
//! ```json
//! {
//!   "genesis_time": 1700000000,
//!   "owner": "0x...",
//!   "validators": [{ "id": 1, "auth": "0x...", "pubkey": "0x...", "self_stake": "500000" }],
//!   "delegations": [{ "delegator": "0x...", "validator_id": 1, "stake": "1000" }]
//! }
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sfc_core::decimal::{as_tokens, UNIT};
use sfc_core::{Address, Timestamp, ValidatorId, ValidatorStatus};
use sfc_staking::{DriverToken, GenesisDelegation, GenesisLockup, GenesisValidator, Sfc};
use std::path::Path;

/// Genesis document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisFile {
    /// End time of the genesis anchor (Unix seconds)
    pub genesis_time: Timestamp,
    /// Ledger owner
    pub owner: String,
    /// Genesis validators
    pub validators: Vec<GenesisValidatorEntry>,
    /// Genesis delegations, applied after every validator
    #[serde(default)]
    pub delegations: Vec<GenesisDelegationEntry>,
}

/// Validator with its self-stake
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidatorEntry {
    pub id: ValidatorId,
    pub auth: String,
    /// Consensus public key (hex)
    pub pubkey: String,
    #[serde(with = "as_tokens")]
    pub self_stake: u128,
    /// Status bits (0 = OK)
    #[serde(default)]
    pub status: u64,
}

/// Delegation carried over at genesis
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDelegationEntry {
    pub delegator: String,
    pub validator_id: ValidatorId,
    #[serde(with = "as_tokens")]
    pub stake: u128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockup: Option<GenesisLockupEntry>,
    /// Unlocked rewards owed
    #[serde(default, with = "as_tokens")]
    pub rewards: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisLockupEntry {
    #[serde(with = "as_tokens")]
    pub locked_stake: u128,
    pub end_time: Timestamp,
    /// Lockup duration in seconds
    pub duration: u64,
    #[serde(default, with = "as_tokens")]
    pub early_unlock_penalty: u128,
}

fn parse_address(s: &str) -> anyhow::Result<Address> {
    Address::from_hex(s).with_context(|| format!("invalid address {s:?}"))
}

impl GenesisFile {
    /// Read a JSON genesis file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading genesis {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write as pretty JSON
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn owner(&self) -> anyhow::Result<Address> {
        parse_address(&self.owner)
    }

    /// Install every validator and delegation through the driver.
    /// Returns the IDs of the validators with OK status.
    pub fn apply(&self, sfc: &mut Sfc, token: &DriverToken) -> anyhow::Result<Vec<ValidatorId>> {
        let now = self.genesis_time;
        let mut active = Vec::new();

        for entry in &self.validators {
            let auth = parse_address(&entry.auth)?;
            let pubkey = hex::decode(entry.pubkey.trim_start_matches("0x"))
                .with_context(|| format!("invalid pubkey of validator {}", entry.id))?;
            let status = ValidatorStatus(entry.status);
            sfc.set_genesis_validator(
                token,
                GenesisValidator {
                    auth,
                    validator_id: entry.id,
                    pubkey,
                    status,
                    created_epoch: 0,
                    created_time: now,
                    deactivated_epoch: 0,
                    deactivated_time: if status.is_ok() { 0 } else { now },
                },
                now,
            )
            .with_context(|| format!("genesis validator {}", entry.id))?;

            if status.is_ok() {
                if entry.self_stake > 0 {
                    sfc.set_genesis_delegation(
                        token,
                        GenesisDelegation {
                            delegator: auth,
                            validator_id: entry.id,
                            stake: entry.self_stake,
                            lockup: None,
                            rewards: 0,
                        },
                        now,
                    )
                    .with_context(|| format!("self-stake of validator {}", entry.id))?;
                }
                active.push(entry.id);
            }
        }

        for entry in &self.delegations {
            let delegation = GenesisDelegation {
                delegator: parse_address(&entry.delegator)?,
                validator_id: entry.validator_id,
                stake: entry.stake,
                lockup: entry.lockup.as_ref().map(|l| GenesisLockup {
                    locked_stake: l.locked_stake,
                    from_epoch: 0,
                    end_time: l.end_time,
                    duration: l.duration,
                    early_unlock_penalty: l.early_unlock_penalty,
                }),
                rewards: entry.rewards,
            };
            sfc.set_genesis_delegation(token, delegation, now)
                .with_context(|| {
                    format!("genesis delegation {} -> {}", entry.delegator, entry.validator_id)
                })?;
        }

        tracing::info!(
            validators = self.validators.len(),
            delegations = self.delegations.len(),
            active = active.len(),
            "genesis applied"
        );
        Ok(active)
    }

    /// Devnet genesis with `validators` equally staked validators and one
    /// delegator on the first of them
    pub fn sample(validators: u32, genesis_time: Timestamp) -> Self {
        let entries = (1..=validators)
            .map(|i| {
                let label = format!("validator-{i}");
                GenesisValidatorEntry {
                    id: u64::from(i),
                    auth: Address::derive(&label).to_string(),
                    pubkey: format!("0x{}", hex::encode(blake3::hash(label.as_bytes()).as_bytes())),
                    self_stake: 1_000_000 * UNIT,
                    status: 0,
                }
            })
            .collect();

        let delegations = if validators > 0 {
            vec![GenesisDelegationEntry {
                delegator: Address::derive("delegator-1").to_string(),
                validator_id: 1,
                stake: 250_000 * UNIT,
                lockup: None,
                rewards: 0,
            }]
        } else {
            Vec::new()
        };

        Self {
            genesis_time,
            owner: Address::derive("owner").to_string(),
            validators: entries,
            delegations,
        }
    }
}
