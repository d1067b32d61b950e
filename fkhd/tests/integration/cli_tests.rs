use std::process::Command;

use crate::common::{SnapshotFile, assert_contains, init_test_logging};
use crate::common::fixtures::SCENARIO;

#[test]
fn test_fkhd_help_includes_usage() {
    init_test_logging();
    crate::test_log!("TEST START: test_fkhd_help_includes_usage");

    let output = Command::new(env!("CARGO_BIN_EXE_fkhd"))
        .arg("--help")
        .output()
        .expect("Failed to run fkhd --help");

    assert!(output.status.success(), "fkhd --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "fkhd");
    assert_contains(&stdout, "--snapshot");

    crate::test_log!("TEST PASS: test_fkhd_help_includes_usage");
}

#[test]
fn test_fkhd_version() {
    init_test_logging();
    let output = Command::new(env!("CARGO_BIN_EXE_fkhd"))
        .arg("--version")
        .output()
        .expect("Failed to run fkhd --version");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_once_prints_pass_summary() {
    init_test_logging();
    crate::test_log!("TEST START: test_once_prints_pass_summary");

    let snapshot = SnapshotFile::new(SCENARIO);
    let output = snapshot.run(&["--once"]);

    assert!(
        output.status.success(),
        "fkhd --once failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    // Tenant 42 is pruned, so only one server is counted.
    assert_contains(&stdout, "2 threads unarchived in 1 server (");

    crate::test_log!("TEST PASS: test_once_prints_pass_summary");
}

#[test]
fn test_tenant_run_prints_outcome() {
    init_test_logging();
    let snapshot = SnapshotFile::new(SCENARIO);
    let output = snapshot.run(&["--tenant", "1"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "2 threads unarchived in ");
    assert!(!stdout.contains("partial"));
}

#[test]
fn test_check_reports_inherited_permissions_once() {
    init_test_logging();
    let snapshot = SnapshotFile::new(SCENARIO);
    let output = snapshot.run(&["--check", "1"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "Missing permissions (page 1/1)");
    assert_contains(&stdout, "**Global**\n- view_channel");
    assert_contains(&stdout, "**Categories**\n- <#100>: manage_threads");
    assert!(!stdout.contains("**Forums**"), "forums inherit everything: {stdout}");
}

#[test]
fn test_track_rejects_wrong_kind() {
    init_test_logging();
    let snapshot = SnapshotFile::new(SCENARIO);
    let output = snapshot.run(&["--track", "1", "forum", "<#100>"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "The provided forum is invalid or not a forum.");
}

#[test]
fn test_track_then_list() {
    init_test_logging();
    let snapshot = SnapshotFile::new(SCENARIO);
    let output = snapshot.run(&["--track", "1", "forum", "<#20>"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "<#20> added.");
    assert_contains(&stdout, "**Forum**:\n- <#20>");
    assert_contains(&stdout, "**Category**:\n- <#100>");
}

#[test]
fn test_list_unknown_tenant() {
    init_test_logging();
    let snapshot = SnapshotFile::new(SCENARIO);
    let output = snapshot.run(&["--list", "7"]);

    assert!(output.status.success());
    assert_contains(&String::from_utf8_lossy(&output.stdout), "No channel found.");
}

#[test]
fn test_missing_snapshot_fails() {
    init_test_logging();
    let config = tempfile::NamedTempFile::new().expect("Failed to create temp config");
    let output = Command::new(env!("CARGO_BIN_EXE_fkhd"))
        .arg("--config")
        .arg(config.path())
        .args(["--snapshot", "/nonexistent/snapshot.toml", "--once"])
        .output()
        .expect("Failed to run fkhd");

    assert!(!output.status.success());
    assert_contains(&String::from_utf8_lossy(&output.stderr), "Failed to read snapshot");
}
