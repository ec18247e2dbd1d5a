//! Tests for the `config` command and configuration layering.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

/// Test that defaults are printed as TOML.
#[test]
fn test_config_defaults() {
    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.current_dir(std::env::temp_dir())
        .env_remove("MILIGHT_MQTT_HOST")
        .env_remove("MILIGHT_DEBUG")
        .arg("config");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("host = \"127.0.0.1\""))
        .stdout(predicate::str::contains("port = 1883"))
        .stdout(predicate::str::contains("heartbeat_secs = 10"));
}

/// Test that file values are loaded and the password is masked.
#[test]
fn test_config_from_file() {
    let file = config_file(
        r#"
debug = "Verbose"

[mqtt]
host = "10.1.1.1"
username = "hub"
password = "hunter2"
"#,
    );

    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.env_remove("MILIGHT_MQTT_HOST")
        .env_remove("MILIGHT_DEBUG")
        .arg("--config")
        .arg(file.path())
        .arg("config");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("10.1.1.1"))
        .stdout(predicate::str::contains("debug = \"Verbose\""))
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("hunter2").not());
}

/// Test that environment beats the file and flags beat the environment.
#[test]
fn test_config_priority() {
    let file = config_file("debug = \"Normal\"\n[mqtt]\nhost = \"10.1.1.1\"\n");

    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.env("MILIGHT_MQTT_HOST", "192.168.0.9")
        .env("MILIGHT_DEBUG", "Verbose")
        .arg("--config")
        .arg(file.path())
        .arg("--debug")
        .arg("Verbose+")
        .arg("config");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("192.168.0.9"))
        .stdout(predicate::str::contains("debug = \"Verbose+\""));
}

/// Test that a malformed file is rejected.
#[test]
fn test_config_malformed_file() {
    let file = config_file("[mqtt\nhost = 1\n");

    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.arg("--config").arg(file.path()).arg("config");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

/// Test that a bad port in the environment is rejected.
#[test]
fn test_config_bad_env_port() {
    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.current_dir(std::env::temp_dir())
        .env("MILIGHT_MQTT_PORT", "not-a-port")
        .arg("config");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("MILIGHT_"));
}

/// Test that the loaded config file is reported once logging is up.
#[test]
fn test_config_file_is_logged() {
    let file = config_file("heartbeat_secs = 30\n");

    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("MILIGHT_DEBUG")
        .arg("--config")
        .arg(file.path())
        .arg("config");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("heartbeat_secs = 30"))
        .stderr(predicate::str::contains("Loaded config from"));
}
