//! Smoke tests for command wiring. None of these need a database.

use assert_cmd::Command;
use predicates::prelude::*;

fn dsenvios() -> Command {
    let mut cmd = Command::cargo_bin("dsenvios").unwrap();
    // Keep the developer's own config and .env out of the picture.
    cmd.env_remove("DSENVIOS_CONFIG")
        .env_remove("DB_HOST")
        .env_remove("DB_PORT")
        .env_remove("DB_PASSWORD")
        .env_remove("DB_POOL_SIZE")
        .env_remove("DB_QUEUE")
        .env_remove("PORT");
    cmd
}

#[test]
fn test_top_level_help_lists_commands() {
    dsenvios()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("transition"))
        .stdout(predicate::str::contains("guides"));
}

#[test]
fn test_serve_help() {
    dsenvios()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("in-memory"))
        .stdout(predicate::str::contains("cors-permissive"));
}

#[test]
fn test_transition_help() {
    dsenvios()
        .args(["transition", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Target status"));
}

#[test]
fn test_guides_help() {
    dsenvios()
        .args(["guides", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sort column"));
}

#[test]
fn test_create_requires_parties() {
    dsenvios()
        .args(["create", "--peso", "1", "--costo", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--remitente"));
}

#[test]
fn test_config_show_redacts_password() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[database]\nhost = \"db.internal\"\npassword = \"hunter2\"\nmax_connections = 4\n",
    )
    .unwrap();

    dsenvios()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("db.internal"))
        .stdout(predicate::str::contains("max_connections: 4"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn test_config_show_reports_invalid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[database]\nmax_connections = 0\n").unwrap();

    dsenvios()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_connections"));
}

#[test]
fn test_config_path_with_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.toml");

    dsenvios()
        .arg("--config")
        .arg(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("missing.toml"))
        .stdout(predicate::str::contains("not found"));
}

#[test]
fn test_track_rejects_malformed_number_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "").unwrap();

    dsenvios()
        .arg("--config")
        .arg(&path)
        .args(["track", "a b"])
        .assert()
        .failure();
}
