//! Tests for the `run` command.

use assert_cmd::Command;
use predicates::prelude::*;

/// Test that run exposes its broker flags.
#[test]
fn test_run_help() {
    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.arg("run").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--host"))
        .stdout(predicate::str::contains("--port"))
        .stdout(predicate::str::contains("--ignored-topics"))
        .stdout(predicate::str::contains("--options"))
        .stdout(predicate::str::contains("--stdin"));
}

/// Test that an invalid port is rejected before connecting.
#[test]
fn test_run_invalid_port() {
    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.arg("run").arg("--port").arg("99999");

    cmd.assert().failure();
}

/// Test that an invalid pattern aborts start-up.
#[test]
fn test_run_invalid_pattern() {
    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.current_dir(std::env::temp_dir())
        .arg("--state-topic")
        .arg("  ")
        .arg("run");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid topic configuration"));
}
