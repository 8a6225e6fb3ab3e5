//! CLI integration tests for argument handling and startup failures.
//!
//! Uses `assert_cmd` to spawn the `suitedbot` binary and verify exit codes
//! and output. Server behaviour is covered in `serve_integration.rs`.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper: create a Command for the `suitedbot` binary with a clean env.
fn suitedbot() -> Command {
    let mut cmd = cargo_bin_cmd!("suitedbot");
    cmd.env_remove("CRON_SECRET")
        .env_remove("SUITEDBOT_CONFIG")
        .env_remove("SUITEDBOT_URL")
        .env_remove("AUTO_APPROVE_HOURS")
        .env_remove("LISTEN");
    cmd
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    suitedbot()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("SuitedBot task marketplace"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("sweep"));
}

#[test]
fn version_exits_0() {
    suitedbot()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("suitedbot"));
}

#[test]
fn no_subcommand_is_usage_error() {
    suitedbot()
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

// ──────────────────────────────────────────────
// 2. serve startup failures
// ──────────────────────────────────────────────

#[test]
fn serve_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");
    suitedbot()
        .args(["serve", "--listen", "127.0.0.1:0", "--config"])
        .arg(&missing)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("could not read"));
}

#[test]
fn serve_rejects_unknown_config_keys() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("market.toml");
    fs::write(&path, "[market]\nauto_approve_days = 2\n").unwrap();
    suitedbot()
        .args(["serve", "--listen", "127.0.0.1:0", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("could not parse"));
}

#[test]
fn serve_rejects_bot_with_unknown_master() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("market.toml");
    fs::write(
        &path,
        r#"
[[users]]
display_name = "orphan-bot"
user_type = "bot"
master = "55555555-5555-4555-8555-555555555555"
"#,
    )
    .unwrap();
    suitedbot()
        .args(["serve", "--listen", "127.0.0.1:0", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn serve_rejects_non_positive_timeout_flag() {
    suitedbot()
        .args(["serve", "--listen", "127.0.0.1:0", "--auto-approve-hours", "0"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("must be positive"));
}

// ──────────────────────────────────────────────
// 3. sweep
// ──────────────────────────────────────────────

#[test]
fn sweep_requires_cron_secret() {
    suitedbot()
        .args(["sweep", "--url", "http://127.0.0.1:9"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--cron-secret"));
}

#[test]
fn sweep_unreachable_server_exits_1() {
    // Port 9 (discard) is not expected to have an HTTP listener.
    suitedbot()
        .args(["sweep", "--url", "http://127.0.0.1:9", "--cron-secret", "s"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("sweep failed"));
}
