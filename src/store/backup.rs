use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use ts_rs::TS;

use super::{parse_document, RecordStore};
use crate::model::FleetDocument;
use crate::time::backup_stamp;
use crate::error::IoStep;
use crate::{AppError, AppResult};

pub const BACKUP_MARKER: &str = ".bak-";
pub const ERR_BACKUP_INVALID_PATH: &str = "FLEET_BACKUP/INVALID_PATH";
pub const ERR_BACKUP_NAME_EXHAUSTED: &str = "FLEET_BACKUP/NAME_EXHAUSTED";

const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BackupEntry {
    pub path: String,
    pub file_name: String,
    pub stamp: String,
    #[ts(type = "number")]
    pub size_bytes: u64,
}

/// Parsed `<stem>.bak-<stamp>[-<seq>].<ext>` name. Ordering is chronological.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct BackupName {
    stamp: String,
    seq: u32,
}

struct NameParts {
    stem: String,
    ext: Option<String>,
}

fn name_parts(store: &RecordStore) -> NameParts {
    let path = store.path();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("store")
        .to_string();
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(ToString::to_string);
    NameParts { stem, ext }
}

fn backup_file_name(parts: &NameParts, stamp: &str, seq: u32) -> String {
    let core = if seq == 0 {
        stamp.to_string()
    } else {
        format!("{stamp}-{seq}")
    };
    match &parts.ext {
        Some(ext) => format!("{}{BACKUP_MARKER}{core}.{ext}", parts.stem),
        None => format!("{}{BACKUP_MARKER}{core}", parts.stem),
    }
}

fn parse_backup_name(parts: &NameParts, file_name: &str) -> Option<BackupName> {
    let prefix = format!("{}{BACKUP_MARKER}", parts.stem);
    let rest = file_name.strip_prefix(&prefix)?;
    let core = match &parts.ext {
        Some(ext) => rest.strip_suffix(&format!(".{ext}"))?,
        None => rest,
    };
    if core.is_empty() {
        return None;
    }

    if let Some((base, seq)) = core.rsplit_once("Z-") {
        if let Ok(seq) = seq.parse::<u32>() {
            return Some(BackupName {
                stamp: format!("{base}Z"),
                seq,
            });
        }
    }
    Some(BackupName {
        stamp: core.to_string(),
        seq: 0,
    })
}

/// Reserve a backup file for `at`, never overwriting an earlier snapshot.
fn claim_backup_file(store: &RecordStore, at: DateTime<Utc>) -> AppResult<(PathBuf, File)> {
    let parts = name_parts(store);
    let stamp = backup_stamp(at);

    for seq in 0..MAX_NAME_ATTEMPTS {
        let candidate = store.data_dir().join(backup_file_name(&parts, &stamp, seq));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(AppError::from(err).with_operation("create_backup", &candidate));
            }
        }
    }

    Err(AppError::new(
        ERR_BACKUP_NAME_EXHAUSTED,
        "Unable to find a free backup file name",
    )
    .with_context("stamp", stamp))
}

/// Copy the committed file, if any, to a fresh timestamped backup.
pub(crate) fn snapshot_at(store: &RecordStore, at: DateTime<Utc>) -> AppResult<Option<PathBuf>> {
    let live = store.path();
    let mut source = match File::open(live) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(AppError::from(err).with_operation("open_live_store", live)),
    };

    let (target, mut file) = claim_backup_file(store, at)?;
    let copied = io::copy(&mut source, &mut file).and_then(|_| file.sync_all());
    if let Err(err) = copied {
        drop(file);
        let _ = fs::remove_file(&target);
        return Err(AppError::from(err).with_operation("copy_backup", &target));
    }
    Ok(Some(target))
}

pub(crate) fn snapshot(store: &RecordStore) -> AppResult<Option<PathBuf>> {
    snapshot_at(store, Utc::now())
}

/// All backups of `store`, newest first.
pub fn list_backups(store: &RecordStore) -> AppResult<Vec<BackupEntry>> {
    let dir = store.data_dir();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(AppError::from(err).with_operation("list_backups", dir)),
    };

    let parts = name_parts(store);
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.io_step("list_backups", dir)?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(name) = parse_backup_name(&parts, &file_name) else {
            continue;
        };
        let meta = match entry.metadata() {
            Ok(meta) if meta.is_file() => meta,
            _ => continue,
        };
        let stamp = name.stamp.clone();
        found.push((
            name,
            BackupEntry {
                path: entry.path().display().to_string(),
                file_name,
                stamp,
                size_bytes: meta.len(),
            },
        ));
    }

    found.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(found.into_iter().map(|(_, entry)| entry).collect())
}

/// Delete every backup except the newest `keep`. Returns what was removed.
pub fn prune_backups(store: &RecordStore, keep: usize) -> AppResult<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for entry in list_backups(store)?.into_iter().skip(keep) {
        let path = PathBuf::from(&entry.path);
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(err) => warn!(
                target: "fleetkeeper",
                event = "fleet_backup_prune_failed",
                path = %path.display(),
                error = %err
            ),
        }
    }
    info!(
        target: "fleetkeeper",
        event = "fleet_backups_pruned",
        keep,
        removed = removed.len()
    );
    Ok(removed)
}

fn resolve_backup_path(store: &RecordStore, backup: &Path) -> AppResult<PathBuf> {
    let invalid = || {
        AppError::new(
            ERR_BACKUP_INVALID_PATH,
            "Path is not a backup of this fleet store",
        )
        .with_context("path", backup.display().to_string())
    };

    let candidate = match backup.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => backup.to_path_buf(),
        _ => store.data_dir().join(backup),
    };

    let file_name = candidate
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(invalid)?;
    if parse_backup_name(&name_parts(store), file_name).is_none() {
        return Err(invalid());
    }

    let canonical = fs::canonicalize(&candidate).io_step("canonicalize_backup", &candidate)?;
    let data_dir =
        fs::canonicalize(store.data_dir()).io_step("canonicalize_data_dir", store.data_dir())?;
    if canonical.parent() != Some(data_dir.as_path()) {
        return Err(invalid());
    }
    Ok(canonical)
}

/// Make a backup the committed document again.
///
/// The backup is parsed strictly, so a damaged backup never replaces the live
/// file. The regular save path runs, which snapshots the current file first.
pub fn restore_backup(store: &RecordStore, backup: &Path) -> AppResult<FleetDocument> {
    let path = resolve_backup_path(store, backup)?;
    let bytes = fs::read(&path).io_step("read_backup", &path)?;
    let doc = parse_document(&bytes, &path)?;
    store.save(&doc)?;
    info!(
        target: "fleetkeeper",
        event = "fleet_backup_restored",
        path = %path.display(),
        instances = doc.len()
    );
    Ok(doc)
}
