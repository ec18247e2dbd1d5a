//! Tests for the `topics` command.

use assert_cmd::Command;
use predicates::prelude::*;

/// Test the default patterns and subscription filter.
#[test]
fn test_topics_defaults() {
    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.env_remove("MILIGHT_STATE_TOPIC")
        .env_remove("MILIGHT_COMMAND_TOPIC")
        .current_dir(std::env::temp_dir())
        .arg("topics");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "milight/states/{device_id}/{device_type}/{group_id}",
        ))
        .stdout(predicate::str::contains("milight/states/+/+/+"));
}

/// Test resolving a concrete state topic.
#[test]
fn test_topics_resolves_identity() {
    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.current_dir(std::env::temp_dir())
        .arg("topics")
        .arg("--topic")
        .arg("milight/states/0x1C8E/rgb_cct/1");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("0x1C8E"))
        .stdout(predicate::str::contains("RGBCCT"))
        .stdout(predicate::str::contains("milight/0x1C8E/rgb_cct/1"));
}

/// Test an unsupported device type is reported as such.
#[test]
fn test_topics_unsupported_type() {
    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.current_dir(std::env::temp_dir())
        .arg("topics")
        .arg("-t")
        .arg("milight/states/0x1C8E/fut020/1");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("unsupported"));
}

/// Test that a topic outside the pattern fails.
#[test]
fn test_topics_mismatch() {
    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.current_dir(std::env::temp_dir())
        .arg("topics")
        .arg("--topic")
        .arg("milight/0x1C8E/rgb_cct/1");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("does not match the state pattern"));
}

/// Test the hub firmware's colon placeholders via a flag.
#[test]
fn test_topics_colon_pattern_flag() {
    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.current_dir(std::env::temp_dir())
        .arg("--state-topic")
        .arg("hub/:hex_device_id/:device_type/:group_id")
        .arg("topics")
        .arg("--topic")
        .arg("hub/0xAB/cct/2");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("hub/+/+/+"))
        .stdout(predicate::str::contains("milight/0xAB/cct/2"));
}

/// Test that an empty pattern aborts.
#[test]
fn test_topics_empty_pattern() {
    let mut cmd = Command::cargo_bin("milight-bridge").unwrap();
    cmd.current_dir(std::env::temp_dir())
        .env("MILIGHT_COMMAND_TOPIC", "")
        .arg("topics");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid topic configuration"));
}
