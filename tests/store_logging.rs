#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::sync::{Arc, Mutex};

use fleetkeeper_lib::{FleetDocument, InstancePatch, InstanceRegistry, InstanceStatus, RecordStore};
use tracing_subscriber::{fmt, EnvFilter};

#[path = "util.rs"]
mod util;

#[derive(Clone)]
struct TestWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn capture<F: FnOnce()>(f: F) -> String {
    let buf = Arc::new(Mutex::new(Vec::<u8>::new()));
    let writer = buf.clone();
    let subscriber = fmt()
        .with_env_filter(EnvFilter::new("fleetkeeper=debug"))
        .with_writer(move || TestWriter(writer.clone()))
        .json()
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buf.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}

#[test]
fn corrupt_load_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(dir.path());
    fs::write(store.path(), b"{ nope").unwrap();

    let logs = capture(|| {
        assert_eq!(store.load(), FleetDocument::default());
    });
    assert!(
        logs.contains("\"event\":\"fleet_store_load_fallback\""),
        "missing fallback log: {logs}"
    );
    assert!(logs.contains("FLEET_STORE/CORRUPT"), "missing code: {logs}");
}

#[test]
fn missing_file_is_silent() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(dir.path());

    let logs = capture(|| {
        store.load();
    });
    assert!(logs.is_empty(), "unexpected logs: {logs}");
}

#[test]
fn mutations_emit_events() {
    let dir = tempfile::tempdir().unwrap();
    let registry = InstanceRegistry::new(RecordStore::new(dir.path()));

    let logs = capture(|| {
        registry
            .create(util::record("i1", "demo", InstanceStatus::NeedsSetup))
            .unwrap();
        registry
            .patch("i1", InstancePatch::status(InstanceStatus::Running))
            .unwrap();
        registry.remove("i1").unwrap();
    });
    for event in [
        "instance_created",
        "instance_patched",
        "instance_removed",
        "fleet_store_saved",
    ] {
        assert!(
            logs.contains(&format!("\"event\":\"{event}\"")),
            "missing {event}: {logs}"
        );
    }
}

#[test]
fn off_shape_record_is_logged_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(dir.path());
    fs::write(
        store.path(),
        br#"{"version":1,"instances":{"b":{"id":"b","name":"B","status":"running"}}}"#,
    )
    .unwrap();

    let logs = capture(|| {
        let doc = store.load();
        assert!(doc.is_empty());
        assert!(doc.contains("b"));
    });
    assert!(
        logs.contains("\"event\":\"fleet_store_record_unreadable\""),
        "missing unreadable log: {logs}"
    );
    assert!(!logs.contains("fleet_store_load_fallback"), "{logs}");
}
