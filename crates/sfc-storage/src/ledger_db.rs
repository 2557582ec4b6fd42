//! Ledger persistence

use crate::error::{Result, StorageError};
use crate::frame;
use parking_lot::RwLock;
use sfc_core::Epoch;
use sfc_staking::{DriverToken, EpochSnapshot, LedgerState, Sfc, SnapshotStore};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LEDGER_FILE: &str = "ledger.bin";
const SNAPSHOT_DIR: &str = "snapshots";
const DRIVER_KEY_FILE: &str = "driver.key";

/// Ledger state plus its snapshot history, as loaded from disk
pub struct StoredLedger {
    pub state: LedgerState,
    pub snapshots: SnapshotStore,
}

/// On-disk store for one ledger
pub struct LedgerStore {
    root: PathBuf,
    /// Highest snapshot epoch known to be on disk
    persisted_epoch: RwLock<Option<Epoch>>,
}

impl LedgerStore {
    /// Open (creating if needed) the store under `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(SNAPSHOT_DIR))?;
        let persisted_epoch = Self::stored_epochs(&root)?.last().copied();
        debug!(root = %root.display(), ?persisted_epoch, "ledger store opened");
        Ok(Self {
            root,
            persisted_epoch: RwLock::new(persisted_epoch),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a ledger has been saved here
    pub fn exists(&self) -> bool {
        self.root.join(LEDGER_FILE).is_file()
    }

    fn snapshot_path(&self, epoch: Epoch) -> PathBuf {
        self.root.join(SNAPSHOT_DIR).join(format!("{epoch:010}.bin"))
    }

    /// Sorted epochs of the snapshot files under `root`
    fn stored_epochs(root: &Path) -> Result<Vec<Epoch>> {
        let mut epochs = Vec::new();
        for entry in std::fs::read_dir(root.join(SNAPSHOT_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bin") {
                continue;
            }
            let epoch = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<Epoch>().ok())
                .ok_or_else(|| StorageError::Corrupt {
                    path: path.display().to_string(),
                    reason: "unexpected snapshot file name",
                })?;
            epochs.push(epoch);
        }
        epochs.sort_unstable();
        Ok(epochs)
    }

    /// Append one sealed snapshot; stored snapshots are never rewritten
    pub fn append_snapshot(&self, snapshot: &EpochSnapshot) -> Result<()> {
        let mut persisted = self.persisted_epoch.write();
        let expected = persisted.map_or(0, |e| e + 1);
        if snapshot.epoch < expected {
            return Err(StorageError::SnapshotExists(snapshot.epoch));
        }
        if snapshot.epoch != expected {
            return Err(StorageError::SnapshotGap {
                expected,
                found: snapshot.epoch,
            });
        }
        frame::write(&self.snapshot_path(snapshot.epoch), snapshot)?;
        *persisted = Some(snapshot.epoch);
        Ok(())
    }

    pub fn save_state(&self, state: &LedgerState) -> Result<()> {
        frame::write(&self.root.join(LEDGER_FILE), state)
    }

    /// Persist the ledger: new snapshots first, then the state that
    /// refers to them
    pub fn save(&self, sfc: &Sfc) -> Result<()> {
        let from = *self.persisted_epoch.read();
        let pending: Vec<&EpochSnapshot> = match from {
            Some(epoch) => sfc.snapshots().since(epoch).iter().collect(),
            None => sfc.snapshots().iter().collect(),
        };
        for snapshot in &pending {
            self.append_snapshot(snapshot)?;
        }
        self.save_state(sfc.state())?;
        debug!(
            sealed_epoch = sfc.current_sealed_epoch(),
            new_snapshots = pending.len(),
            "ledger saved"
        );
        Ok(())
    }

    /// Load the stored ledger, or `None` if nothing was saved yet.
    ///
    /// Snapshots past the state's sealed epoch were appended by a save that
    /// never wrote its state; they are deleted so the next save rewrites them.
    pub fn load(&self) -> Result<Option<StoredLedger>> {
        if !self.exists() {
            return Ok(None);
        }
        let state: LedgerState = frame::read(&self.root.join(LEDGER_FILE))?;
        let sealed = state.clock.current_sealed_epoch();

        let mut persisted = self.persisted_epoch.write();
        let mut snapshots = Vec::new();
        for (expected, epoch) in Self::stored_epochs(&self.root)?.into_iter().enumerate() {
            if epoch > sealed {
                warn!(epoch, sealed_epoch = sealed, "discarding snapshot ahead of ledger state");
                std::fs::remove_file(self.snapshot_path(epoch))?;
                continue;
            }
            let expected = expected as Epoch;
            if epoch != expected {
                return Err(StorageError::SnapshotGap {
                    expected,
                    found: epoch,
                });
            }
            snapshots.push(frame::read::<EpochSnapshot>(&self.snapshot_path(epoch))?);
        }
        let snapshots = SnapshotStore::from_snapshots(snapshots)?;
        *persisted = Some(snapshots.latest_epoch());

        info!(
            root = %self.root.display(),
            sealed_epoch = snapshots.latest_epoch(),
            validators = state.ledger.validators.len(),
            "ledger loaded"
        );
        Ok(Some(StoredLedger { state, snapshots }))
    }

    pub fn save_driver_token(&self, token: &DriverToken) -> Result<()> {
        frame::write(&self.root.join(DRIVER_KEY_FILE), token.as_bytes())
    }

    pub fn load_driver_token(&self) -> Result<Option<DriverToken>> {
        let path = self.root.join(DRIVER_KEY_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes: [u8; 32] = frame::read(&path)?;
        Ok(Some(DriverToken::from_bytes(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfc_core::UNIT;
    use sfc_staking::{
        AccrualVersion, ConstantsManager, EconomicParams, NodeDriverAuth, SfcConfig,
        ValidatorMetrics,
    };

    fn sample_ledger() -> (Sfc, DriverToken) {
        let (auth, token) = NodeDriverAuth::issue();
        let config = SfcConfig {
            accrual: AccrualVersion::Legacy,
            constants: ConstantsManager::unchecked(EconomicParams::testing()),
            ..Default::default()
        };
        let mut sfc = Sfc::new(config, Box::new(auth));
        let auth_addr = sfc_core::Address::derive("validator");
        let id = sfc
            .create_validator(auth_addr, vec![1, 2], 10 * UNIT, 0)
            .unwrap();
        sfc.seal_epoch(&token, &[], 0, 10).unwrap();
        sfc.seal_epoch_validators(&token, &[id], 10).unwrap();
        sfc.seal_epoch(&token, &[ValidatorMetrics::online(id, 90)], 0, 100)
            .unwrap();
        (sfc, token)
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::open(dir.path()).unwrap();
        assert!(store.load().unwrap().is_none());

        let (sfc, token) = sample_ledger();
        store.save(&sfc).unwrap();
        store.save_driver_token(&token).unwrap();

        let reopened = LedgerStore::open(dir.path()).unwrap();
        let stored = reopened.load().unwrap().unwrap();
        assert_eq!(&stored.state, sfc.state());
        assert_eq!(&stored.snapshots, sfc.snapshots());

        let token = reopened.load_driver_token().unwrap().unwrap();
        let restored = Sfc::restore(
            stored.state,
            stored.snapshots,
            Box::new(NodeDriverAuth::for_token(&token)),
        )
        .unwrap();
        assert_eq!(restored.current_sealed_epoch(), 2);
    }

    #[test]
    fn test_save_appends_only_new_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::open(dir.path()).unwrap();
        let (sfc, _) = sample_ledger();
        store.save(&sfc).unwrap();
        store.save(&sfc).unwrap();
        assert_eq!(
            std::fs::read_dir(dir.path().join(SNAPSHOT_DIR)).unwrap().count(),
            3
        );
        assert!(matches!(
            store.append_snapshot(sfc.snapshots().latest()),
            Err(StorageError::SnapshotExists(2))
        ));
    }

    #[test]
    fn test_missing_snapshot_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::open(dir.path()).unwrap();
        let (sfc, _) = sample_ledger();
        store.save(&sfc).unwrap();
        std::fs::remove_file(store.snapshot_path(1)).unwrap();

        let err = LedgerStore::open(dir.path()).unwrap().load().err().unwrap();
        assert!(matches!(err, StorageError::SnapshotGap { expected: 1, found: 2 }));
        assert!(err.is_corruption());
    }

    #[test]
    fn test_interrupted_save_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::open(dir.path()).unwrap();
        let (mut sfc, token) = sample_ledger();
        store.save(&sfc).unwrap();

        // epoch 3 reaches disk but the state sealed through 2 stays
        sfc.seal_epoch_validators(&token, &[1], 100).unwrap();
        sfc.seal_epoch(&token, &[ValidatorMetrics::online(1, 100)], 0, 200)
            .unwrap();
        store.append_snapshot(sfc.snapshots().latest()).unwrap();

        let reopened = LedgerStore::open(dir.path()).unwrap();
        let stored = reopened.load().unwrap().unwrap();
        assert_eq!(stored.state.clock.current_sealed_epoch(), 2);
        assert_eq!(stored.snapshots.latest_epoch(), 2);
        assert!(!reopened.snapshot_path(3).exists());
        let restored = Sfc::restore(
            stored.state,
            stored.snapshots,
            Box::new(NodeDriverAuth::for_token(&token)),
        )
        .unwrap();
        assert_eq!(restored.current_sealed_epoch(), 2);

        // the next save writes epoch 3 again
        reopened.save(&sfc).unwrap();
        let stored = reopened.load().unwrap().unwrap();
        assert_eq!(&stored.state, sfc.state());
        assert_eq!(stored.snapshots.latest_epoch(), 3);
    }
}
