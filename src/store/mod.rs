//! Durable single-file store for the fleet document.
//!
//! The whole document is read and written as a unit. Writes go through
//! [`write_atomic`] after the previous file has been copied to a timestamped
//! backup, so a crash at any point leaves a complete `fleet.json` behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::FleetConfig;
use crate::model::FleetDocument;
use crate::error::IoStep;
use crate::{AppError, AppResult};

mod atomic;
pub mod backup;

pub use atomic::{tmp_path_for, write_atomic, TMP_SUFFIX};
pub use backup::{list_backups, prune_backups, restore_backup, BackupEntry};

pub const STORE_FILE_NAME: &str = "fleet.json";
pub const ERR_CORRUPT: &str = "FLEET_STORE/CORRUPT";

/// Strict parse of a stored document; failures carry [`ERR_CORRUPT`].
pub(crate) fn parse_document(bytes: &[u8], path: &Path) -> AppResult<FleetDocument> {
    serde_json::from_slice(bytes).map_err(|err| {
        AppError::new(ERR_CORRUPT, "Fleet store file could not be parsed")
            .with_context("path", path.display().to_string())
            .with_cause(AppError::from(err))
    })
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    path: Arc<PathBuf>,
}

impl RecordStore {
    /// Store backed by `fleet.json` inside `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self::at(data_dir.as_ref().join(STORE_FILE_NAME))
    }

    /// Store backed by an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    pub fn from_config(config: &FleetConfig) -> Self {
        Self::at(config.store_path())
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn data_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    pub fn tmp_path(&self) -> PathBuf {
        tmp_path_for(self.path())
    }

    /// Read the committed document.
    ///
    /// Never fails: a missing file yields an empty document, and an unreadable
    /// or unparseable one is logged and also treated as empty. Use
    /// [`RecordStore::try_load`] to see those failures.
    pub fn load(&self) -> FleetDocument {
        match self.try_load() {
            Ok(doc) => doc,
            Err(err) => {
                warn!(
                    target: "fleetkeeper",
                    event = "fleet_store_load_fallback",
                    code = %err.code(),
                    path = %self.path().display(),
                    error = %err
                );
                FleetDocument::default()
            }
        }
    }

    /// Like [`RecordStore::load`], but a present-and-broken file is an error.
    pub fn try_load(&self) -> AppResult<FleetDocument> {
        let bytes = match fs::read(self.path()) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(FleetDocument::default()),
            Err(err) => return Err(AppError::from(err).with_operation("read_store", self.path())),
        };
        parse_document(&bytes, self.path())
    }

    /// Commit `doc` as the new canonical document.
    ///
    /// Creates the data directory when missing, snapshots the current file to
    /// `<stem>.bak-<stamp>.<ext>` (best effort), then writes atomically. Errors
    /// from the directory, the temporary file, or the rename are returned.
    pub fn save(&self, doc: &FleetDocument) -> AppResult<()> {
        self.save_with(doc, backup::snapshot)
    }

    pub(crate) fn save_with<F>(&self, doc: &FleetDocument, snapshot: F) -> AppResult<()>
    where
        F: FnOnce(&RecordStore) -> AppResult<Option<PathBuf>>,
    {
        let dir = self.data_dir();
        fs::create_dir_all(dir).io_step("create_data_dir", dir)?;

        let backup = match snapshot(self) {
            Ok(path) => path,
            Err(err) => {
                warn!(
                    target: "fleetkeeper",
                    event = "fleet_store_backup_failed",
                    code = %err.code(),
                    path = %self.path().display(),
                    error = %err
                );
                None
            }
        };

        let mut payload = serde_json::to_vec_pretty(doc)
            .map_err(|err| AppError::from(err).with_context("operation", "serialize_store"))?;
        payload.push(b'\n');
        write_atomic(self.path(), &payload)?;

        debug!(
            target: "fleetkeeper",
            event = "fleet_store_saved",
            path = %self.path().display(),
            instances = doc.len(),
            backup = ?backup
        );
        Ok(())
    }
}
