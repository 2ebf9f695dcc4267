//! Smoke tests for the testkit CLI
//!
//! These tests verify basic functionality of the CLI without requiring
//! bitcoind or LND.

use std::io::Write;
use std::process::{Command, Output};

const TESTKIT_VARS: [&str; 9] = [
    "TESTKIT_BITCOIND_URL",
    "TESTKIT_BITCOIND_PUBLIC_PORT",
    "TESTKIT_ZMQ_TX_PORT",
    "TESTKIT_ZMQ_BLOCK_PORT",
    "TESTKIT_LND_URL",
    "TESTKIT_LND_MACAROON",
    "TESTKIT_LND_TLS_CERT",
    "TESTKIT_LND_P2P_PORT",
    "TESTKIT_WAIT_TIMEOUT",
];

fn testkit(args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_testkit"));
    for var in TESTKIT_VARS {
        command.env_remove(var);
    }
    command
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI can show help
#[test]
fn test_cli_help() {
    let output = testkit(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    for command in ["warm-up", "pay", "pay-legacy", "invoice", "mine", "auto-mine", "scenario"] {
        assert!(stdout.contains(command), "Help should mention '{}'", command);
    }
}

/// Test that version is shown
#[test]
fn test_cli_version() {
    let output = testkit(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

/// Without a config file the environment is required
#[test]
fn test_missing_environment() {
    let output = testkit(&["mine", "1"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(
        stderr.contains("TESTKIT_BITCOIND_URL"),
        "Error should name the missing variable, got: {}",
        stderr
    );
}

/// Config errors are reported before anything is contacted
#[test]
fn test_invalid_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "this is not = = toml").unwrap();

    let path = file.path().to_str().unwrap();
    let output = testkit(&["--config", path, "mine", "1"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Failed to load config"), "got: {}", stderr);
}

/// `--system` and `--config` are exclusive
#[test]
fn test_system_conflicts_with_config() {
    let output = testkit(&["--system", "--config", "net.toml", "mine", "1"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("--system"), "got: {}", stderr);
}
