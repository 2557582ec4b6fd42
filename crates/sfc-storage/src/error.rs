//! Storage errors

use sfc_core::{Epoch, SfcError};
use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    // === I/O ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("atomic rename failed: {0}")]
    Persist(#[from] tempfile::PersistError),

    // === Encoding ===
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("corrupt file {path}: {reason}")]
    Corrupt { path: String, reason: &'static str },

    // === Layout ===
    #[error("snapshot for epoch {0} already stored")]
    SnapshotExists(Epoch),

    #[error("snapshot gap: expected epoch {expected}, found {found}")]
    SnapshotGap { expected: Epoch, found: Epoch },

    #[error("ledger rejected stored state: {0}")]
    Ledger(#[from] SfcError),
}

impl StorageError {
    /// Whether the data on disk is unusable (as opposed to a transient failure)
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Corrupt { .. } | Self::SnapshotGap { .. } | Self::Encoding(_) | Self::Ledger(_)
        )
    }
}
