//! Integration tests for the berth CLI

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Run berth against an isolated data directory and empty config file
fn berth(data: &Path, args: &[&str]) -> Output {
    let config = data.join("config.toml");
    if !config.exists() {
        std::fs::write(&config, "").expect("write config");
    }

    Command::new(env!("CARGO_BIN_EXE_berth"))
        .arg("--config")
        .arg(&config)
        .args(args)
        .env("BERTH_DATA_DIR", data.join("data"))
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute berth")
}

#[test]
fn test_cli_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_berth"))
        .arg("--version")
        .output()
        .expect("Failed to execute berth");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("berth"));
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_berth"))
        .arg("--help")
        .output()
        .expect("Failed to execute berth");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Queue-driven installer"));
    assert!(stdout.contains("enqueue"));
    assert!(stdout.contains("update-all"));
    assert!(stdout.contains("faults"));
}

#[test]
fn test_cli_invalid_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_berth"))
        .arg("invalid-command")
        .output()
        .expect("Failed to execute berth");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unrecognized subcommand"));
}

#[test]
fn test_enqueue_requires_file() {
    let output = Command::new(env!("CARGO_BIN_EXE_berth"))
        .arg("enqueue")
        .output()
        .expect("Failed to execute berth");

    assert!(!output.status.success());
}

#[test]
fn test_json_list_on_fresh_database() {
    let temp = TempDir::new().unwrap();
    let output = berth(temp.path(), &["--json", "list"]);

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["type"], "JobList");
    assert_eq!(value["data"], serde_json::json!([]));
    assert!(temp.path().join("data").join("jobs.sqlite").exists());
}

#[test]
fn test_json_faults_on_fresh_database() {
    let temp = TempDir::new().unwrap();
    let output = berth(temp.path(), &["--json", "faults"]);

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["type"], "Faults");
}

#[test]
fn test_enqueue_empty_job_file() {
    let temp = TempDir::new().unwrap();
    let jobs = temp.path().join("jobs.toml");
    std::fs::write(&jobs, "jobs = []\n").unwrap();

    let output = berth(temp.path(), &["--json", "enqueue", jobs.to_str().unwrap()]);

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["type"], "Enqueue");
    assert_eq!(value["data"]["accepted"], serde_json::json!([]));
    assert_eq!(value["data"]["rejected"], serde_json::json!([]));
}

#[test]
fn test_enqueue_rejects_malformed_job_file() {
    let temp = TempDir::new().unwrap();
    let jobs = temp.path().join("jobs.toml");
    std::fs::write(&jobs, "[[jobs]]\npackage_name = \"org.example\"\n").unwrap();

    let output = berth(temp.path(), &["enqueue", jobs.to_str().unwrap()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"));
}

#[test]
fn test_cancel_unknown_job_fails() {
    let temp = TempDir::new().unwrap();
    let output = berth(temp.path(), &["cancel", "missing-job"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing-job"));
}
