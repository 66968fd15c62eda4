//! CLI behavior when no daemon is running: graceful status output, clear
//! errors for data commands, and clap-level argument validation.

use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn tally_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tally"));
    cmd.env("HOME", home).env("USERPROFILE", home);
    cmd
}

#[test]
fn daemon_status_reports_not_running() {
    let home = TempDir::new().expect("home");
    tally_cmd(home.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(contains("\"running\": false"));
}

#[test]
fn daemon_stop_is_graceful_when_not_running() {
    let home = TempDir::new().expect("home");
    tally_cmd(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("daemon is not running"));
}

#[test]
fn list_fails_with_daemon_hint() {
    let home = TempDir::new().expect("home");
    tally_cmd(home.path())
        .args(["list"])
        .assert()
        .failure()
        .stderr(contains("failed to fetch sections"));
}

#[test]
fn inc_fails_with_session_hint() {
    let home = TempDir::new().expect("home");
    tally_cmd(home.path())
        .args(["inc", "hall", "1"])
        .assert()
        .failure()
        .stderr(contains("is the daemon running?"));
}

#[test]
fn delete_requires_at_least_one_id() {
    let home = TempDir::new().expect("home");
    tally_cmd(home.path())
        .args(["delete", "hall"])
        .assert()
        .failure();
}

#[test]
fn inc_rejects_non_numeric_ids() {
    let home = TempDir::new().expect("home");
    tally_cmd(home.path())
        .args(["inc", "hall", "stalls"])
        .assert()
        .failure();
}

#[test]
fn daemon_logs_handles_missing_files() {
    let home = TempDir::new().expect("home");
    tally_cmd(home.path())
        .args(["daemon", "logs"])
        .assert()
        .success()
        .stdout(contains("log file not found"));
}
