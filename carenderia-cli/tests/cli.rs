//! CLI integration tests for carenderia
//!
//! The API points at a closed port so nothing here needs a live server.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

fn setup_test_env() -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("carenderia.db");

    let config_content = format!(
        r#"
[api]
base_url = "http://127.0.0.1:1"
timeout_secs = 2

[storage]
path = "{}"
"#,
        escape_path_for_toml(&db_path.to_string_lossy())
    );
    fs::write(&config_path, config_content).unwrap();

    (temp_dir, config_path.to_string_lossy().to_string())
}

fn carenderia(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("carenderia").unwrap();
    cmd.env_remove("CARENDERIA_API_URL")
        .env_remove("CARENDERIA_CONFIG")
        .arg("--config")
        .arg(config_path);
    cmd
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("carenderia")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("menu"))
        .stdout(predicate::str::contains("favorites"))
        .stdout(predicate::str::contains("coupons"))
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_favorites_list_works_offline() {
    let (_dir, config) = setup_test_env();

    carenderia(&config)
        .args(["favorites", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No favorites yet"));
}

#[test]
fn test_favorites_list_json() {
    let (_dir, config) = setup_test_env();

    let output = carenderia(&config)
        .args(["--format", "json", "favorites", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["ids"], serde_json::json!([]));
}

#[test]
fn test_out_of_range_rating_is_invalid_input() {
    let (_dir, config) = setup_test_env();

    carenderia(&config)
        .args(["reviews", "add", "--rating", "6", "--comment", "too good"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_profile_requires_login() {
    let (_dir, config) = setup_test_env();

    carenderia(&config)
        .args(["profile", "show"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Account Required"));
}

#[test]
fn test_wallet_requires_login() {
    let (_dir, config) = setup_test_env();

    carenderia(&config)
        .args(["coupons", "wallet"])
        .assert()
        .code(2);
}

#[test]
fn test_logout_when_logged_out() {
    let (_dir, config) = setup_test_env();

    carenderia(&config)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));
}

#[test]
fn test_unreachable_server_is_general_error() {
    let (_dir, config) = setup_test_env();

    carenderia(&config)
        .arg("menu")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unable to reach the server"));
}

#[test]
fn test_login_rejects_empty_password() {
    let (_dir, config) = setup_test_env();

    carenderia(&config)
        .args(["login", "juan", "--password-stdin"])
        .write_stdin("\n")
        .assert()
        .code(3);
}
