//! End-to-end tests running the `bt` binary against project files.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn bt_binary() -> String {
    env!("CARGO_BIN_EXE_bt").to_string()
}

const PROJECT: &str = r#"{
    "ethogram": [
        {"code": "rest", "type": "state"},
        {"code": "feed", "type": "state"},
        {"code": "bite", "type": "point"}
    ],
    "observations": [
        {
            "id": "rater1",
            "kind": "LIVE",
            "events": [
                {"time": "0", "behavior": "rest"},
                {"time": "5", "behavior": "rest"},
                {"time": "5", "behavior": "feed"},
                {"time": "7", "behavior": "bite"},
                {"time": "9", "behavior": "feed"}
            ]
        },
        {
            "id": "rater2",
            "kind": "LIVE",
            "events": [
                {"time": "0", "behavior": "rest"},
                {"time": "5", "behavior": "rest"},
                {"time": "5", "behavior": "feed"},
                {"time": "7", "behavior": "bite"},
                {"time": "9", "behavior": "feed"}
            ]
        }
    ]
}"#;

const BROKEN: &str = r#"{
    "ethogram": [{"code": "rest", "type": "state"}],
    "observations": [
        {"id": "open", "kind": "LIVE", "events": [{"time": "2", "behavior": "rest"}]}
    ]
}"#;

fn write_project(temp: &Path, name: &str, contents: &str) -> PathBuf {
    let path = temp.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Run `bt` with an isolated home so no user config leaks in.
fn bt(temp: &Path, args: &[&str]) -> Output {
    Command::new(bt_binary())
        .env("HOME", temp)
        .env("XDG_CONFIG_HOME", temp.join(".config"))
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run bt")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_check_accepts_valid_project() {
    let temp = TempDir::new().unwrap();
    let project = write_project(temp.path(), "project.json", PROJECT);

    let output = bt(temp.path(), &["check", project.to_str().unwrap()]);
    assert!(
        output.status.success(),
        "check should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let text = stdout(&output);
    assert!(text.contains("rater1"));
    assert!(!text.contains("FAILED"));
}

#[test]
fn test_check_reports_unpaired_state() {
    let temp = TempDir::new().unwrap();
    let project = write_project(temp.path(), "broken.json", BROKEN);

    let output = bt(temp.path(), &["check", project.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("FAILED"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 of 1 observations failed validation"));
}

#[test]
fn test_time_budget_text() {
    let temp = TempDir::new().unwrap();
    let project = write_project(temp.path(), "project.json", PROJECT);

    let output = bt(
        temp.path(),
        &["time-budget", project.to_str().unwrap(), "-o", "rater1"],
    );
    assert!(output.status.success());
    let text = stdout(&output);
    let rest = text
        .lines()
        .find(|l| l.contains("rest"))
        .expect("rest row present");
    assert!(rest.contains("5.000"), "unexpected row: {rest}");
    assert!(rest.contains("0.556"), "unexpected row: {rest}");
}

#[test]
fn test_filter_json_output() {
    let temp = TempDir::new().unwrap();
    let project = write_project(temp.path(), "project.json", PROJECT);

    let output = bt(
        temp.path(),
        &[
            "filter",
            project.to_str().unwrap(),
            "-e",
            r#""No focal subject|feed" & ("No focal subject|feed" | "No focal subject|rest")"#,
            "--json",
        ],
    );
    assert!(
        output.status.success(),
        "filter should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = json["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["kind"] == "interval"));
    assert!(json["generated_at"].is_string());
    assert!(json["failures"].as_array().unwrap().is_empty());
}

#[test]
fn test_malformed_filter_fails() {
    let temp = TempDir::new().unwrap();
    let project = write_project(temp.path(), "project.json", PROJECT);

    let output = bt(
        temp.path(),
        &["filter", project.to_str().unwrap(), "-e", r#""A|walk" &"#],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid filter expression"));
}

#[test]
fn test_kappa_identical_codings() {
    let temp = TempDir::new().unwrap();
    let project = write_project(temp.path(), "project.json", PROJECT);

    let output = bt(temp.path(), &["kappa", project.to_str().unwrap()]);
    assert!(
        output.status.success(),
        "kappa should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let text = stdout(&output);
    assert!(text.contains("Observations: rater1 - rater2"));
    assert!(text.contains("Cohen's kappa: 1.000"));
}

#[test]
fn test_config_file_sets_failure_policy() {
    let temp = TempDir::new().unwrap();
    let project = write_project(temp.path(), "broken.json", BROKEN);
    let config = write_project(temp.path(), "bt.toml", "failure_policy = \"abort\"\n");

    let output = bt(
        temp.path(),
        &[
            "--config",
            config.to_str().unwrap(),
            "time-budget",
            project.to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to prepare observations"));

    // Command line wins over the config file.
    let output = bt(
        temp.path(),
        &[
            "--config",
            config.to_str().unwrap(),
            "--on-failure",
            "annotate",
            "time-budget",
            project.to_str().unwrap(),
        ],
    );
    assert!(output.status.success());
    assert!(stdout(&output).contains("UNPAIRED"));
}
