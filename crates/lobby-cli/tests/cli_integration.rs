//! CLI Integration Tests
//!
//! These tests verify the CLI commands work correctly end-to-end.
//! Nothing here opens a network channel; `open` is covered by the
//! lobby-core handshake tests over the in-memory bus.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// Create a CLI command with a temporary data directory
fn cli_cmd(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lobby").expect("Failed to find lobby binary");
    cmd.arg("--data-dir").arg(data_dir.path());
    cmd
}

/// Extract the DID from `identity` output (format: "  DID: <did>")
fn extract_did(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("  DID: "))
        .map(|did| did.trim().to_string())
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("Failed to run lobby");
    assert!(output.status.success(), "command failed: {:?}", output);
    String::from_utf8(output.stdout).expect("utf-8 output")
}

// ============================================================================
// Identity Command Tests
// ============================================================================

#[test]
fn test_identity_command() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .arg("identity")
        .assert()
        .success()
        .stdout(predicate::str::contains("Lobby Link"))
        .stdout(predicate::str::contains("DID: did:key:z6Mk"))
        .stdout(predicate::str::contains("Username: (none)"));
}

#[test]
fn test_identity_is_stable_across_runs() {
    let data_dir = TempDir::new().unwrap();

    let first = extract_did(&stdout_of(cli_cmd(&data_dir).arg("identity"))).unwrap();
    let second = extract_did(&stdout_of(cli_cmd(&data_dir).arg("identity"))).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_separate_data_dirs_have_separate_identities() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();

    let did_a = extract_did(&stdout_of(cli_cmd(&a).arg("identity"))).unwrap();
    let did_b = extract_did(&stdout_of(cli_cmd(&b).arg("identity"))).unwrap();
    assert_ne!(did_a, did_b);
}

// ============================================================================
// Username Command Tests
// ============================================================================

#[test]
fn test_username_valid() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["username", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Valid: true"))
        .stdout(predicate::str::contains("Available locally: true"));
}

#[test]
fn test_username_availability_is_labelled_local() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["username", "root"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Available locally: false"))
        .stdout(predicate::str::contains("Available:").not());
}

#[test]
fn test_verbose_logging_goes_to_stderr() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["-vv", "identity"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DID: did:key:z6Mk"))
        .stderr(predicate::str::contains("Using data directory"));
}

#[test]
fn test_username_reserved() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["username", "admin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Valid: false"))
        .stdout(predicate::str::contains("Available locally: false"));
}

// ============================================================================
// Encrypt / Decrypt Command Tests
// ============================================================================

#[test]
fn test_encrypt_then_decrypt() {
    let data_dir = TempDir::new().unwrap();

    let envelope = stdout_of(cli_cmd(&data_dir).args(["encrypt", "hunter2", "hello lobby"]));
    let envelope = envelope.trim();
    assert!(envelope.len() > 16);

    cli_cmd(&data_dir)
        .args(["decrypt", "hunter2", envelope])
        .assert()
        .success()
        .stdout(predicate::str::diff("hello lobby\n"));
}

#[test]
fn test_decrypt_wrong_passphrase_fails() {
    let data_dir = TempDir::new().unwrap();

    let envelope = stdout_of(cli_cmd(&data_dir).args(["encrypt", "right", "secret"]));

    cli_cmd(&data_dir)
        .args(["decrypt", "wrong", envelope.trim()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Decryption failed"));
}

#[test]
fn test_decrypt_garbage_fails() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["decrypt", "anything", "short"])
        .assert()
        .failure();
}

// ============================================================================
// Link Command Tests
// ============================================================================

#[test]
fn test_link_prints_token() {
    let data_dir = TempDir::new().unwrap();

    let token = stdout_of(cli_cmd(&data_dir).args(["link", "did:key:z6MkApp"]));
    let token = token.trim();
    assert_eq!(token.split('.').count(), 3);
}

#[test]
fn test_link_rejects_blank_audience() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["link", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid audience"));
}

// ============================================================================
// Config and Help Tests
// ============================================================================

#[test]
fn test_bad_config_file_fails() {
    let data_dir = TempDir::new().unwrap();
    let config = data_dir.path().join("lobby.json");
    std::fs::write(&config, "not json").unwrap();

    cli_cmd(&data_dir)
        .arg("--config")
        .arg(&config)
        .arg("identity")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_config_file_is_applied() {
    let data_dir = TempDir::new().unwrap();
    let config = data_dir.path().join("lobby.json");
    std::fs::write(&config, r#"{"ucan_lifetime_secs": 60}"#).unwrap();

    let token = stdout_of(
        cli_cmd(&data_dir)
            .arg("--config")
            .arg(&config)
            .args(["link", "did:key:z6MkApp"]),
    );
    assert_eq!(token.trim().split('.').count(), 3);
}

#[test]
fn test_help() {
    Command::cargo_bin("lobby")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("identity"))
        .stdout(predicate::str::contains("open"))
        .stdout(predicate::str::contains("link"));
}
