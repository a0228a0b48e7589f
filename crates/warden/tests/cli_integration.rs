//! CLI integration tests for the warden command-line interface.
//!
//! These tests verify:
//! - Help text is displayed correctly
//! - Argument parsing works as expected
//! - Missing configuration and missing sessions are reported clearly
//!
//! Note: These tests do not require a running portal - anything that would
//! reach the network points at a closed local port.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the warden binary.
fn warden() -> Command {
    Command::cargo_bin("warden").unwrap()
}

/// A warden command isolated from the user's config, data and environment.
fn isolated(dir: &Path) -> Command {
    std::fs::write(
        dir.join("config.toml"),
        format!("data_dir = {:?}\n", dir.join("data").display().to_string()),
    )
    .unwrap();

    let mut cmd = warden();
    cmd.current_dir(dir)
        .env("WARDEN_CONFIG_DIR", dir)
        .env_remove("WARDEN_API_BASE")
        .env_remove("WARDEN_KC_BASE_URL")
        .env_remove("WARDEN_KC_REALM")
        .env_remove("WARDEN_KC_CLIENT_ID")
        .env_remove("WARDEN_KC_REDIRECT");
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    warden()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("SOC portal"));
}

#[test]
fn test_version_displays() {
    warden()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("warden"));
}

#[test]
fn test_help_lists_subcommands() {
    warden()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("register"))
        .stdout(predicate::str::contains("logout"))
        .stdout(predicate::str::contains("whoami"))
        .stdout(predicate::str::contains("roles"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Global Flag Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_global_flags_accepted() {
    warden()
        .args(["--verbose", "--json", "--server", "http://localhost:9999", "--help"])
        .assert()
        .success();
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommand Parsing Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_login_help() {
    warden()
        .args(["login", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--email"))
        .stdout(predicate::str::contains("--otp"))
        .stdout(predicate::str::contains("--browser"));
}

#[test]
fn test_login_browser_conflicts_with_email() {
    warden()
        .args(["login", "--browser", "--email", "a@x.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_roles_subcommands_listed() {
    warden()
        .args(["roles", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("request"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("approve"))
        .stdout(predicate::str::contains("reject"))
        .stdout(predicate::str::contains("pending"));
}

#[test]
fn test_roles_request_rejects_unknown_role() {
    warden()
        .args(["roles", "request", "admin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("admin"));
}

#[test]
fn test_roles_approve_needs_numeric_id() {
    warden()
        .args(["roles", "approve", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid"));
}

#[test]
fn test_unknown_subcommand_fails() {
    warden()
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_backend_names_field() {
    let dir = TempDir::new().unwrap();
    isolated(dir.path())
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("backend.base_url"));
}

#[test]
fn test_whoami_without_session() {
    let dir = TempDir::new().unwrap();
    isolated(dir.path())
        .args(["--server", "http://127.0.0.1:9", "whoami"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not signed in"));
}

#[test]
fn test_browser_login_requires_identity_provider() {
    let dir = TempDir::new().unwrap();
    isolated(dir.path())
        .args(["--server", "http://127.0.0.1:9", "login", "--browser"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("identity_provider.base_url"));
}

#[test]
fn test_logout_without_session_succeeds() {
    let dir = TempDir::new().unwrap();
    isolated(dir.path())
        .args(["--server", "http://127.0.0.1:9", "--json", "logout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"signed_out\": true"));
}

#[test]
fn test_server_flag_beats_environment() {
    let dir = TempDir::new().unwrap();
    isolated(dir.path())
        .env("WARDEN_API_BASE", "not a url")
        .args(["--server", "http://127.0.0.1:9", "whoami"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not signed in"));
}
