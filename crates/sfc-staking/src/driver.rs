//! Node-driver capability and outbound signals
//!
//! Sealing, deactivation and genesis bootstrap are reserved to the node
//! driver. The driver proves itself with a [`DriverToken`] issued once when
//! the ledger is created; the ledger keeps only its digest.
//!
//! The ledger never calls back into the driver. Weight and gas price
//! changes are queued as [`DriverSignal`]s and drained by the driver after
//! each call.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sfc_core::prelude::*;
use std::fmt;

/// Secret held by the node driver
pub struct DriverToken([u8; 32]);

impl DriverToken {
    /// Fresh random token
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Token from stored bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn digest(&self) -> [u8; 32] {
        *blake3::hash(&self.0).as_bytes()
    }
}

impl fmt::Debug for DriverToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DriverToken(..)")
    }
}

/// Checks that a driver-only call carries the driver capability
pub trait DriverAuthority: Send + Sync {
    fn authorize(&self, token: &DriverToken) -> Result<()>;
}

/// Authority that accepts exactly one token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDriverAuth {
    digest: [u8; 32],
}

impl NodeDriverAuth {
    /// New authority and the only token it accepts
    pub fn issue() -> (Self, DriverToken) {
        let token = DriverToken::generate();
        (Self::for_token(&token), token)
    }

    /// Authority accepting an existing token
    pub fn for_token(token: &DriverToken) -> Self {
        Self {
            digest: token.digest(),
        }
    }
}

impl DriverAuthority for NodeDriverAuth {
    fn authorize(&self, token: &DriverToken) -> Result<()> {
        if token.digest() == self.digest {
            Ok(())
        } else {
            Err(SfcError::NotDriver)
        }
    }
}

/// Notification for the node driver
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverSignal {
    /// Consensus weight of a validator changed (0 when not OK)
    ValidatorWeight {
        validator_id: ValidatorId,
        weight: u128,
    },
    /// New minimum gas price in wei
    MinGasPrice(u128),
}
