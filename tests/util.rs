#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use fleetkeeper_lib::{InstanceRecord, InstanceRegistry, InstanceStatus, RecordStore, Timestamp};
use tempfile::TempDir;

pub fn temp_registry() -> (TempDir, InstanceRegistry) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let registry = InstanceRegistry::new(RecordStore::new(dir.path()));
    (dir, registry)
}

pub fn record(id: &str, name: &str, status: InstanceStatus) -> InstanceRecord {
    let mut record = InstanceRecord::new(id, name, status);
    record.created_at = Timestamp::from("2024-01-01T00:00:00Z");
    record
}

pub fn backup_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut found: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("fleet.bak-"))
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    found
}
