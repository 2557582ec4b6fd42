//! Node configuration types

use serde::{Deserialize, Serialize};
use sfc_staking::{AccrualVersion, ConstantsManager, EconomicParams};
use std::path::Path;
use std::time::Duration;

/// Complete node configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node operation settings
    #[serde(default)]
    pub node: NodeSettings,

    /// Economic parameters
    #[serde(default)]
    pub economics: EconomicsConfig,

    /// Devnet driver behaviour
    #[serde(default)]
    pub devnet: DevnetConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl NodeConfig {
    /// Read a TOML config file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Basic node settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Node name
    #[serde(default = "default_node_name")]
    pub name: String,

    /// Data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Reward accrual scheme for a fresh ledger
    #[serde(default)]
    pub accrual: AccrualVersion,
}

fn default_node_name() -> String {
    "sfc-devnet".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            data_dir: default_data_dir(),
            accrual: AccrualVersion::default(),
        }
    }
}

/// Parameter preset
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EconomicsPreset {
    Mainnet,
    /// Mainnet ratios with a tiny stake floor; bounds not enforced
    #[default]
    Testing,
}

/// Economic parameters: a preset, or a full `[economics.params]` table
/// that is validated against the parameter bounds
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EconomicsConfig {
    #[serde(default)]
    pub preset: EconomicsPreset,

    /// Explicit values (token amounts as decimal strings)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<EconomicParams>,
}

impl EconomicsConfig {
    pub fn constants(&self) -> anyhow::Result<ConstantsManager> {
        Ok(match (&self.params, self.preset) {
            (Some(params), _) => ConstantsManager::new(params.clone())?,
            (None, EconomicsPreset::Mainnet) => ConstantsManager::new(EconomicParams::mainnet())?,
            (None, EconomicsPreset::Testing) => {
                ConstantsManager::unchecked(EconomicParams::testing())
            }
        })
    }
}

/// Devnet driver configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DevnetConfig {
    /// Seconds between epoch seals
    #[serde(default = "default_epoch_interval")]
    pub epoch_interval_secs: u64,

    /// Synthetic gas usage reported per second of epoch
    #[serde(default = "default_gas_per_second")]
    pub gas_per_second: u64,

    /// Synthetic fee originated by each validator per epoch (tokens)
    #[serde(default, with = "sfc_core::decimal::as_tokens")]
    pub fee_per_validator: u128,
}

fn default_epoch_interval() -> u64 {
    60
}

fn default_gas_per_second() -> u64 {
    1_500_000
}

impl DevnetConfig {
    pub fn epoch_interval(&self) -> Duration {
        Duration::from_secs(self.epoch_interval_secs.max(1))
    }
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            epoch_interval_secs: default_epoch_interval(),
            gas_per_second: default_gas_per_second(),
            fee_per_validator: 0,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics address
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

fn default_true() -> bool {
    true
}

fn default_metrics_address() -> String {
    "127.0.0.1:9615".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_metrics_address(),
        }
    }
}
