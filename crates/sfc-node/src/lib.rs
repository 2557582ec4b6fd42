//! # SFC Node
//!
//! Devnet driver for the SFC staking ledger: loads configuration and
//! genesis, owns the ledger and the driver capability, seals epochs on a
//! timer, persists after every commit and exports Prometheus metrics.

pub mod config;
pub mod genesis;
pub mod metrics;
pub mod node;

pub use config::NodeConfig;
pub use genesis::GenesisFile;
pub use node::{NodeState, SfcNode};
