//! Smoke tests for the bitferry CLI.
//!
//! These tests verify basic CLI functionality:
//! - `bitferry --version` outputs version info
//! - `bitferry --help` outputs help text
//! - `bitferry show` on an empty environment outputs valid JSON

mod common;

use assert_cmd::Command;
use common::{TestEnv, parse_json};
use predicates::prelude::*;

fn bitferry() -> Command {
    Command::new(env!("CARGO_BIN_EXE_bitferry"))
}

#[test]
fn test_version_flag() {
    bitferry()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bitferry"))
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_help_flag() {
    bitferry()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("Options:"));
}

#[test]
fn test_no_args_is_usage_error() {
    bitferry()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_task_help() {
    bitferry()
        .args(["create", "task", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("copy"))
        .stdout(predicate::str::contains("backup"));
}

#[test]
fn test_show_empty() {
    let env = TestEnv::new();
    let output = env.bitferry().arg("show").output().unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_eq!(json["volumes"].as_array().unwrap().len(), 0);
    assert_eq!(json["tasks"].as_array().unwrap().len(), 0);
}

#[test]
fn test_show_empty_human() {
    let env = TestEnv::new();
    env.bitferry()
        .args(["show", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No intact volumes."));
}

#[test]
fn test_config_reports_sources() {
    let env = TestEnv::new();
    std::fs::write(
        env.config_dir.path().join("config.kdl"),
        "restic \"/opt/restic\"\n",
    )
    .unwrap();
    let output = env
        .bitferry()
        .args(["config", "--rclone", "/opt/rclone"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_eq!(json["rclone"]["value"], "/opt/rclone");
    assert_eq!(json["rclone"]["source"], "cli");
    assert_eq!(json["restic"]["source"], "config");
    assert_eq!(json["scan_mounts"]["value"], "false");
    assert_eq!(json["scan_mounts"]["source"], "env:BITFERRY_SCAN_MOUNTS");
}

#[test]
fn test_invalid_config_fails() {
    let env = TestEnv::new();
    std::fs::write(env.config_dir.path().join("config.kdl"), "rclone \"open\n").unwrap();
    env.bitferry()
        .arg("show")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}
