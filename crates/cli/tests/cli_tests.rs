//! CLI integration tests

use std::process::Command;

fn stressctl(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "stress-cli", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = stressctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Stress Fleet"), "Should show app name");
    assert!(stdout.contains("create"), "Should show create command");
    assert!(stdout.contains("list"), "Should show list command");
    assert!(stdout.contains("delete"), "Should show delete command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = stressctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("stressctl"), "Should show binary name");
}

/// Test create subcommand help
#[test]
fn test_create_help() {
    let output = stressctl(&["create", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Create help should succeed");
    assert!(stdout.contains("--cpu"), "Should show cpu option");
    assert!(stdout.contains("--memory"), "Should show memory option");
    assert!(stdout.contains("--count"), "Should show count option");
    assert!(stdout.contains("--inactive"), "Should show inactive option");
}

/// Test delete subcommand help
#[test]
fn test_delete_help() {
    let output = stressctl(&["delete", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Delete help should succeed");
    assert!(stdout.contains("--all"), "Should show all option");
}

/// Test that delete needs an id or --all
#[test]
fn test_delete_requires_target() {
    let output = stressctl(&["delete"]);

    assert!(!output.status.success(), "Delete without target should fail");
}

/// Test that an id and --all are mutually exclusive
#[test]
fn test_delete_id_conflicts_with_all() {
    let output = stressctl(&["delete", "some-id", "--all"]);

    assert!(!output.status.success(), "Id with --all should fail");
}

/// Test that create needs its targets
#[test]
fn test_create_missing_argument() {
    let output = stressctl(&["create", "--cpu", "50"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Missing --memory should fail");
    assert!(stderr.contains("--memory"), "Should name the missing option");
}

/// Test format option
#[test]
fn test_format_option() {
    let output = stressctl(&["--format", "json", "--help"]);

    assert!(output.status.success(), "Format option should be accepted");
}

/// Test invalid command
#[test]
fn test_invalid_command() {
    let output = stressctl(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");
}

/// Test unreachable API reports an error
#[test]
fn test_unreachable_api_fails() {
    let output = stressctl(&["--api-url", "http://127.0.0.1:1", "list"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Unreachable API should fail");
    assert!(stderr.contains("Failed to send request"));
}
