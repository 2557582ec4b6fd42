//! Core type definitions for the SFC ledger

use crate::error::{Result, SfcError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validator identifier, assigned sequentially starting at 1
pub type ValidatorId = u64;

/// Epoch number; epoch 0 is the genesis anchor
pub type Epoch = u64;

/// Lockup identifier, unique per (staker, validator) record
pub type LockupId = u64;

/// Withdrawal request identifier chosen by the staker
pub type WithdrawalRequestId = u64;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Account identity (20 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Create from raw bytes
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Address with every byte set to `byte` (handy for fixtures)
    pub fn repeat_byte(byte: u8) -> Self {
        Self([byte; 20])
    }

    /// Deterministic address derived from a label
    pub fn derive(label: &str) -> Self {
        let hash = blake3::hash(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash.as_bytes()[..20]);
        Self(bytes)
    }

    /// Parse a `0x`-prefixed (or bare) hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let decoded =
            hex::decode(trimmed).map_err(|_| SfcError::InvalidAddress(s.to_string()))?;
        let bytes: [u8; 20] = decoded
            .try_into()
            .map_err(|_| SfcError::InvalidAddress(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{}..)", hex::encode(&self.0[..4]))
    }
}

/// Validator status bitmask
///
/// Numeric value grows with severity, so a deactivation only ever moves a
/// validator to a larger value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct ValidatorStatus(pub u64);

impl ValidatorStatus {
    /// Active and eligible for rewards
    pub const OK: ValidatorStatus = ValidatorStatus(0);
    /// Self-stake fully withdrawn
    pub const WITHDRAWN: ValidatorStatus = ValidatorStatus(1);
    /// Missed too many blocks for too long
    pub const OFFLINE: ValidatorStatus = ValidatorStatus(1 << 3);
    /// Double-signing detected
    pub const DOUBLESIGN: ValidatorStatus = ValidatorStatus(1 << 7);

    /// Bits that mark a validator as a cheater subject to slashing
    pub const CHEATER_MASK: u64 = Self::DOUBLESIGN.0;

    /// Raw bit value
    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn is_ok(&self) -> bool {
        self.0 == Self::OK.0
    }

    pub fn is_cheater(&self) -> bool {
        self.0 & Self::CHEATER_MASK != 0
    }

    /// Check whether all bits of `other` are set
    pub fn contains(&self, other: ValidatorStatus) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Whether `bits` is one of the known deactivation statuses
    pub fn is_deactivation(bits: u64) -> bool {
        bits == Self::WITHDRAWN.0 || bits == Self::OFFLINE.0 || bits == Self::DOUBLESIGN.0
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self.0 {
            0 => "ok",
            1 => "withdrawn",
            8 => "offline",
            128 => "doublesign",
            _ => "mixed",
        }
    }
}

impl fmt::Debug for ValidatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorStatus({}={:#x})", self.name(), self.0)
    }
}

impl fmt::Display for ValidatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
