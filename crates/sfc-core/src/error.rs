//! Error types for SFC ledger operations
//!
//! Every failure is surfaced synchronously and leaves ledger state untouched.
//! Messages match the strings the ledger has always reported so that
//! tooling matching on them keeps working.

use crate::types::{Epoch, LockupId, ValidatorId, WithdrawalRequestId};
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, SfcError>;

/// Failure category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller lacks the driver or owner capability
    Authorization,
    /// Malformed or out-of-range input
    Validation,
    /// A ledger invariant would be violated
    Invariant,
    /// Operation not possible in the current state
    State,
    /// Arithmetic or encoding failure
    Internal,
}

/// Errors that can occur in SFC ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SfcError {
    // === Authorization ===
    /// Driver-only entry point called without the driver capability
    #[error("caller is not the authorized driver")]
    NotDriver,

    /// Owner-only entry point called by someone else
    #[error("caller is not the owner")]
    NotOwner,

    // === Validation ===
    #[error("empty pubkey")]
    EmptyPubkey,

    #[error("validator doesn't exist")]
    ValidatorNotFound(ValidatorId),

    #[error("validator already exists")]
    ValidatorExists,

    #[error("zero amount")]
    ZeroAmount,

    #[error("incorrect duration")]
    IncorrectDuration,

    /// No such lockup for this delegation
    #[error("not locked up")]
    NotLockedUp,

    #[error("request doesn't exist")]
    RequestNotFound(WithdrawalRequestId),

    #[error("wrID already exists")]
    RequestExists(WithdrawalRequestId),

    /// Deactivation requested with a non-deactivation status
    #[error("wrong status")]
    WrongStatus,

    #[error("must be less than or equal to 1.0")]
    RatioTooLarge,

    /// Constants manager setter rejected a value
    #[error("{parameter}: {reason}")]
    ParameterOutOfBounds {
        parameter: &'static str,
        reason: &'static str,
    },

    /// Sealing metrics do not line up with the epoch's validator set
    #[error("metrics for {got} validators, epoch has {expected}")]
    MetricsMismatch { expected: usize, got: usize },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid token amount: {0}")]
    InvalidAmount(String),

    // === Invariant guards ===
    #[error("insufficient self-stake")]
    InsufficientSelfStake,

    #[error("validator's delegations limit is exceeded")]
    DelegationsLimitExceeded,

    /// Lock amount exceeds unlocked stake
    #[error("not enough stake")]
    NotEnoughStake,

    #[error("not enough unlocked stake")]
    NotEnoughUnlockedStake,

    #[error("not enough locked stake")]
    NotEnoughLockedStake,

    #[error("validator lockup period will end earlier")]
    ValidatorLockupEndsEarlier,

    #[error("lockup duration cannot decrease")]
    LockupDurationDecrease,

    /// Legacy accrual allows a single active lockup per delegation
    #[error("already locked up")]
    AlreadyLockedUp(LockupId),

    #[error("not enough time passed")]
    NotEnoughTimePassed,

    #[error("not enough epochs passed")]
    NotEnoughEpochsPassed,

    #[error("stake is fully slashed")]
    FullySlashed,

    #[error("locked stake is greater than the whole stake")]
    LockedExceedsStake,

    // === State ===
    #[error("validator isn't active")]
    ValidatorNotActive(ValidatorId),

    #[error("zero rewards")]
    ZeroRewards,

    #[error("nothing to stash")]
    NothingToStash,

    #[error("validator isn't slashed")]
    ValidatorNotSlashed(ValidatorId),

    /// Deactivation would not raise the validator's status
    #[error("validator status is already at least as severe")]
    StatusNotMoreSevere(ValidatorId),

    #[error("epoch {0} is awaiting its validator set")]
    AwaitingValidators(Epoch),

    #[error("epoch {0} has not been sealed yet")]
    NotAwaitingValidators(Epoch),

    // === Internal ===
    #[error("arithmetic overflow")]
    Overflow,

    #[error("internal error: {0}")]
    Internal(String),
}

impl SfcError {
    /// Taxonomy bucket for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotDriver | Self::NotOwner => ErrorKind::Authorization,

            Self::EmptyPubkey
            | Self::ValidatorNotFound(_)
            | Self::ValidatorExists
            | Self::ZeroAmount
            | Self::IncorrectDuration
            | Self::NotLockedUp
            | Self::RequestNotFound(_)
            | Self::RequestExists(_)
            | Self::WrongStatus
            | Self::RatioTooLarge
            | Self::ParameterOutOfBounds { .. }
            | Self::MetricsMismatch { .. }
            | Self::InvalidAddress(_)
            | Self::InvalidAmount(_) => ErrorKind::Validation,

            Self::InsufficientSelfStake
            | Self::DelegationsLimitExceeded
            | Self::NotEnoughStake
            | Self::NotEnoughUnlockedStake
            | Self::NotEnoughLockedStake
            | Self::ValidatorLockupEndsEarlier
            | Self::LockupDurationDecrease
            | Self::AlreadyLockedUp(_)
            | Self::NotEnoughTimePassed
            | Self::NotEnoughEpochsPassed
            | Self::FullySlashed
            | Self::LockedExceedsStake => ErrorKind::Invariant,

            Self::ValidatorNotActive(_)
            | Self::ZeroRewards
            | Self::NothingToStash
            | Self::ValidatorNotSlashed(_)
            | Self::StatusNotMoreSevere(_)
            | Self::AwaitingValidators(_)
            | Self::NotAwaitingValidators(_) => ErrorKind::State,

            Self::Overflow | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable numeric code for API responses
    pub fn code(&self) -> u32 {
        let base = match self.kind() {
            ErrorKind::Authorization => 1000,
            ErrorKind::Validation => 2000,
            ErrorKind::Invariant => 3000,
            ErrorKind::State => 4000,
            ErrorKind::Internal => 9000,
        };
        base + match self {
            Self::NotDriver => 1,
            Self::NotOwner => 2,
            Self::EmptyPubkey => 1,
            Self::ValidatorNotFound(_) => 2,
            Self::ValidatorExists => 3,
            Self::ZeroAmount => 4,
            Self::IncorrectDuration => 5,
            Self::NotLockedUp => 6,
            Self::RequestNotFound(_) => 7,
            Self::RequestExists(_) => 8,
            Self::WrongStatus => 9,
            Self::RatioTooLarge => 10,
            Self::ParameterOutOfBounds { .. } => 11,
            Self::MetricsMismatch { .. } => 12,
            Self::InvalidAddress(_) => 13,
            Self::InvalidAmount(_) => 14,
            Self::InsufficientSelfStake => 1,
            Self::DelegationsLimitExceeded => 2,
            Self::NotEnoughStake => 3,
            Self::NotEnoughUnlockedStake => 4,
            Self::NotEnoughLockedStake => 5,
            Self::ValidatorLockupEndsEarlier => 6,
            Self::LockupDurationDecrease => 7,
            Self::AlreadyLockedUp(_) => 8,
            Self::NotEnoughTimePassed => 9,
            Self::NotEnoughEpochsPassed => 10,
            Self::FullySlashed => 11,
            Self::LockedExceedsStake => 12,
            Self::ValidatorNotActive(_) => 1,
            Self::ZeroRewards => 2,
            Self::NothingToStash => 3,
            Self::ValidatorNotSlashed(_) => 4,
            Self::StatusNotMoreSevere(_) => 5,
            Self::AwaitingValidators(_) => 6,
            Self::NotAwaitingValidators(_) => 7,
            Self::Overflow => 1,
            Self::Internal(_) => 999,
        }
    }

    /// Whether the caller may succeed by retrying later without changing inputs
    pub fn is_retryable_later(&self) -> bool {
        matches!(
            self,
            Self::NotEnoughTimePassed
                | Self::NotEnoughEpochsPassed
                | Self::ZeroRewards
                | Self::NothingToStash
                | Self::AwaitingValidators(_)
                | Self::NotAwaitingValidators(_)
        )
    }
}
