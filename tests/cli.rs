use std::path::Path;
use std::process::Output;

use anyhow::Result;
use assert_cmd::Command;
use fleetkeeper_lib::{InstanceRecord, InstanceStatus};
use serde_json::Value;
use tempfile::tempdir;

fn fleetkeeper(data_dir: &Path, args: &[&str]) -> Result<Output> {
    let output = Command::cargo_bin("fleetkeeper")?
        .env_remove("DATA_DIR")
        .env("FLEET_LOG", "off")
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .output()?;
    Ok(output)
}

fn describe(output: &Output) -> String {
    format!(
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn create_get_patch_remove() -> Result<()> {
    let tmp = tempdir()?;
    let data = tmp.path().join("data");

    let output = fleetkeeper(
        &data,
        &["create", "--name", "demo", "--id", "i1", "--domain", "demo.example.com"],
    )?;
    assert!(output.status.success(), "{}", describe(&output));
    let created: InstanceRecord = serde_json::from_slice(&output.stdout)?;
    assert_eq!(created.id, "i1");
    assert_eq!(created.status(), InstanceStatus::NeedsSetup);
    assert_eq!(created.setup_password.as_deref().map(str::len), Some(16));
    assert!(data.join("fleet.json").exists());

    let output = fleetkeeper(&data, &["patch", "i1", "--json", r#"{"status":"running","notes":null}"#])?;
    assert!(output.status.success(), "{}", describe(&output));
    let patched: InstanceRecord = serde_json::from_slice(&output.stdout)?;
    assert_eq!(patched.status, "running");
    assert_eq!(patched.domain.as_deref(), Some("demo.example.com"));

    let output = fleetkeeper(&data, &["get", "i1"])?;
    assert!(output.status.success(), "{}", describe(&output));
    let fetched: InstanceRecord = serde_json::from_slice(&output.stdout)?;
    assert_eq!(fetched, patched);

    let output = fleetkeeper(&data, &["remove", "i1"])?;
    assert!(output.status.success(), "{}", describe(&output));

    let output = fleetkeeper(&data, &["list"])?;
    let listed: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(listed["instances"], Value::Array(Vec::new()));
    Ok(())
}

#[test]
fn missing_instance_exits_with_not_found_code() -> Result<()> {
    let tmp = tempdir()?;

    for args in [
        &["get", "ghost"][..],
        &["remove", "ghost"][..],
        &["patch", "ghost", "--json", r#"{"name":"x"}"#][..],
    ] {
        let output = fleetkeeper(tmp.path(), args)?;
        assert_eq!(output.status.code(), Some(2), "{}", describe(&output));
        assert!(output.stdout.is_empty());
        assert!(String::from_utf8_lossy(&output.stderr).contains("ghost"));
    }
    assert!(!tmp.path().join("fleet.json").exists());
    Ok(())
}

#[test]
fn invalid_input_exits_with_error() -> Result<()> {
    let tmp = tempdir()?;
    fleetkeeper(tmp.path(), &["create", "--name", "a", "--id", "a"])?;

    let output = fleetkeeper(tmp.path(), &["patch", "a", "--json", r#"{"status":"paused"}"#])?;
    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));

    let output = fleetkeeper(tmp.path(), &["create", "--name", "b", "--id", "a", "--unique"])?;
    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));
    Ok(())
}

#[test]
fn data_dir_comes_from_environment() -> Result<()> {
    let tmp = tempdir()?;

    let output = Command::cargo_bin("fleetkeeper")?
        .env("DATA_DIR", tmp.path())
        .env("FLEET_LOG", "off")
        .args(["create", "--name", "env", "--id", "e1"])
        .output()?;
    assert!(output.status.success(), "{}", describe(&output));
    assert!(tmp.path().join("fleet.json").exists());
    Ok(())
}

#[test]
fn backups_list_prune_restore() -> Result<()> {
    let tmp = tempdir()?;
    for id in ["a", "b", "c"] {
        let output = fleetkeeper(tmp.path(), &["create", "--name", id, "--id", id])?;
        assert!(output.status.success(), "{}", describe(&output));
    }

    let output = fleetkeeper(tmp.path(), &["backups", "list"])?;
    assert!(output.status.success(), "{}", describe(&output));
    let listed: Value = serde_json::from_slice(&output.stdout)?;
    let backups = listed["backups"].as_array().cloned().unwrap_or_default();
    assert_eq!(backups.len(), 2);

    // The oldest backup predates "b" and "c".
    let oldest = backups[1]["fileName"].as_str().unwrap_or_default().to_string();
    let output = fleetkeeper(tmp.path(), &["backups", "restore", &oldest])?;
    assert!(output.status.success(), "{}", describe(&output));
    let restored: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(restored["instances"], 1);

    let output = fleetkeeper(tmp.path(), &["get", "b"])?;
    assert_eq!(output.status.code(), Some(2));

    let output = fleetkeeper(tmp.path(), &["backups", "prune", "--keep", "1"])?;
    assert!(output.status.success(), "{}", describe(&output));
    let pruned: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(pruned["removed"].as_array().map(Vec::len), Some(2));
    Ok(())
}
