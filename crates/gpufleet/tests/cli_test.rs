#![allow(deprecated)] // Command::cargo_bin

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

/// Binary isolated from the caller's environment and user config
fn gpufleet(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("gpufleet").unwrap();
    cmd.current_dir(dir)
        .env_remove("GPUFLEET_CONFIG")
        .env_remove("GPUFLEET_ENV")
        .env_remove("GPUFLEET_REGION")
        .env("XDG_CONFIG_HOME", dir.join("xdg"))
        .env("HOME", dir)
        .env("NO_COLOR", "1");
    cmd
}

fn project(dir: &Path) {
    std::fs::write(
        dir.join("gpufleet.yaml"),
        "project: gpu\nenvironment: dev\nregion: us-east-1\n",
    )
    .unwrap();
}

#[test]
fn test_cli_help() {
    let dir = tempfile::tempdir().unwrap();
    gpufleet(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("preflight"))
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("cleanup"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_cli_version() {
    let dir = tempfile::tempdir().unwrap();
    gpufleet(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("gpufleet"));
}

#[test]
fn test_up_help_lists_flags() {
    let dir = tempfile::tempdir().unwrap();
    gpufleet(dir.path())
        .args(["up", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--override-blocked"))
        .stdout(predicate::str::contains("--keep-partial"))
        .stdout(predicate::str::contains("--yes"));
}

#[test]
fn test_missing_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    gpufleet(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("settings file not found"));
}

#[test]
fn test_explicit_config_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    gpufleet(dir.path())
        .args(["--config", "nowhere.yaml", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot load"));
}

#[test]
fn test_status_without_record() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());

    gpufleet(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("gpu"))
        .stdout(predicate::str::contains("not-deployed"));
}

#[test]
fn test_status_reads_persisted_record_per_environment() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    let state_dir = dir.path().join(".gpufleet").join("state");
    std::fs::create_dir_all(&state_dir).unwrap();
    std::fs::write(
        state_dir.join("gpu-dev.json"),
        r#"{
  "version": 1,
  "project": "gpu",
  "environment": "dev",
  "state": "partial_deploy",
  "detail": "insufficient-instance-capacity",
  "updated_at": "2026-01-05T10:00:00Z"
}"#,
    )
    .unwrap();

    gpufleet(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("partial-deploy"))
        .stdout(predicate::str::contains("insufficient-instance-capacity"));

    gpufleet(dir.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"state\": \"partial_deploy\""));

    // Another environment has its own record
    gpufleet(dir.path())
        .args(["--env", "staging", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not-deployed"));
}

#[test]
fn test_rollback_refused_when_nothing_deployed() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());

    gpufleet(dir.path())
        .args(["rollback", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot roll back from state not-deployed"));

    // The state lock does not outlive the run
    assert!(!dir.path().join(".gpufleet").join("lock.json").exists());
}

#[test]
fn test_rollback_refused_while_locked() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    let root = dir.path().join(".gpufleet");
    std::fs::create_dir_all(&root).unwrap();
    let acquired_at = chrono::Utc::now().to_rfc3339();
    std::fs::write(
        root.join("lock.json"),
        format!(r#"{{"holder":"ci","pid":1,"acquired_at":"{}"}}"#, acquired_at),
    )
    .unwrap();

    gpufleet(dir.path())
        .args(["rollback", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("locked"));
}

#[test]
fn test_cleanup_scope_flags_conflict() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());

    gpufleet(dir.path())
        .args(["cleanup", "--prefix", "gpu-dev", "--network", "vpc-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}
