use assert_cmd::prelude::*;
use serde_json::Value;
use std::process::Command;
use tempfile::tempdir;

fn feedwarden(state_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("feedwarden").expect("binary built");
    cmd.env_remove("FEEDWARDEN_CONFIG_JSON")
        .env_remove("RUST_LOG")
        .arg("--state-dir")
        .arg(state_dir)
        .arg("--config")
        .arg(state_dir.join("config.yaml"));
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let assert = cmd.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    serde_json::from_str(&stdout).expect("valid JSON payload")
}

#[test]
fn info_reports_version_and_paths() {
    let dir = tempdir().unwrap();
    let payload = json_stdout(feedwarden(dir.path()).args(["--output", "json", "info"]));
    assert_eq!(payload["name"], "FeedWarden");
    assert_eq!(payload["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(payload["configPresent"], false);
}

#[test]
fn config_show_prints_defaults_and_file_overrides() {
    let dir = tempdir().unwrap();
    let payload = json_stdout(feedwarden(dir.path()).args(["--output", "json", "config", "show"]));
    assert_eq!(payload["serverUrl"], "http://localhost:3000");
    assert_eq!(payload["scoreThresholds"]["hide"], 3.0);

    std::fs::write(
        dir.path().join("config.yaml"),
        "scoreThresholds:\n  hide: 2.0\n  warning: 6.0\n",
    )
    .unwrap();
    let payload = json_stdout(feedwarden(dir.path()).args(["--output", "json", "config", "show"]));
    assert_eq!(payload["scoreThresholds"]["hide"], 2.0);
    assert_eq!(payload["scoreThresholds"]["warning"], 6.0);
}

#[test]
fn invalid_configuration_fails_validation() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.yaml"),
        "scoreThresholds:\n  hide: 8.0\n  warning: 6.0\n",
    )
    .unwrap();
    feedwarden(dir.path())
        .args(["config", "validate"])
        .assert()
        .failure();
}

#[test]
fn audit_and_markers_start_empty() {
    let dir = tempdir().unwrap();
    let entries = json_stdout(feedwarden(dir.path()).args(["--output", "json", "audit", "show"]));
    assert_eq!(entries, Value::Array(Vec::new()));

    let markers = json_stdout(feedwarden(dir.path()).args(["--output", "json", "markers"]));
    assert_eq!(markers["notInterested"], Value::Array(Vec::new()));
    assert_eq!(markers["warning"], Value::Array(Vec::new()));

    feedwarden(dir.path())
        .args(["audit", "clear"])
        .assert()
        .success();
}
