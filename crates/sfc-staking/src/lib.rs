//! # SFC Staking - Validator Ledger, Rewards & Lockups
//!
//! Proof-of-stake bookkeeping driven by an external consensus node.
//!
//! ## Key Features
//!
//! - **Validator & delegation ledger**: self-stake floor, delegation limit,
//!   withdrawal requests with a time and epoch waiting period
//! - **Epoch sealing**: per-epoch reward split by stake and uptime, fee
//!   split, offline deactivation
//! - **Reward accrual**: unlocked ratio plus a lockup bonus proportional to
//!   the committed duration, in two selectable schemes
//! - **Lockups**: lock, relock, early unlock with a burned penalty
//! - **Slashing**: doublesign deactivation with an owner-set refund ratio
//! - **Gas price controller**: damped minimum gas price
//!
//! ## Call Flow
//!
//! ```text
//! ┌──────────────┐  seal_epoch / seal_epoch_validators  ┌─────────────────┐
//! │ Node driver  │ ───────────────────────────────────► │                 │
//! │ (DriverToken)│ ◄─────────── DriverSignal ────────── │      Sfc        │
//! └──────────────┘                                      │ (transactional) │
//! ┌──────────────┐  delegate / lock / claim / ...       │                 │
//! │ Stakers      │ ───────────────────────────────────► │                 │
//! └──────────────┘                                      └─────────────────┘
//! ```
//!
//! | Parameter | Mainnet |
//! |-----------|---------|
//! | Validator commission | 15% |
//! | Unlocked reward ratio | 30% |
//! | Lockup | 14 - 365 days |
//! | Withdrawal period | 7 days and 3 epochs |

pub mod driver;
pub mod epoch;
pub mod gas_price;
pub mod ledger;
pub mod lockup;
pub mod params;
pub mod rewards;
pub mod sfc;
pub mod slashing;
pub mod snapshot;
pub mod staking;

// Re-exports
pub use driver::{DriverAuthority, DriverSignal, DriverToken, NodeDriverAuth};
pub use epoch::{SealReport, ValidatorMetrics};
pub use gas_price::GasPriceController;
pub use ledger::{Accounting, Ledger, Lockup, StakeRecord, Validator, WithdrawalRequest};
pub use params::{ConstantsManager, EconomicParams, RewardScaling};
pub use rewards::{
    scale_lockup_reward, AccrualStrategy, AccrualVersion, Accrued, LegacyAccrual,
    MultiLockAccrual, Rewards,
};
pub use sfc::{LedgerState, SealPhase, Sfc, SfcConfig};
pub use snapshot::{EpochSnapshot, OpenEpoch, SnapshotStore};
pub use staking::{GenesisDelegation, GenesisLockup, GenesisValidator};
