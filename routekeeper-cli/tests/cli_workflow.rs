//! Integration tests for the routekeeper binary.
//!
//! Each test runs the compiled CLI and checks its output and exit code.
//! Config commands always pass `--file` so the user's home directory is
//! never touched.

use std::process::{Command, Output};

use tempfile::TempDir;

fn routekeeper(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_routekeeper"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run routekeeper binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_validate_accepts_pair_and_object() {
    let output = routekeeper(&["coords", "validate", "[18.4861,-69.9312]"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("valid: 18.486100,-69.931200"));

    let output = routekeeper(&[
        "coords",
        "validate",
        r#"{"latitude":18.4861,"longitude":-69.9312}"#,
    ]);
    assert!(output.status.success());
}

#[test]
fn test_validate_rejects_null_island() {
    let output = routekeeper(&["coords", "validate", "[0,0]"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("invalid coordinate"));
}

#[test]
fn test_repair_recovers_comma_string() {
    let output = routekeeper(&["coords", "repair", "18.47,-69.89"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("18.470000,-69.890000 (repaired)"));
}

#[test]
fn test_repair_gives_up_on_garbage() {
    let output = routekeeper(&["coords", "repair", "nowhere in particular"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Not a usable coordinate"));
}

#[test]
fn test_distance_and_within() {
    let output = routekeeper(&[
        "coords",
        "distance",
        "[18.4861,-69.9312]",
        "[18.4861,-69.9312]",
    ]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "0.0 m");

    let output = routekeeper(&[
        "coords",
        "within",
        "[18.4861,-69.9312]",
        "[18.4871,-69.9312]",
        "500",
    ]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "true");

    let output = routekeeper(&[
        "coords",
        "within",
        "[18.4861,-69.9312]",
        "[18.5861,-69.9312]",
        "500",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output).trim(), "false");
}

#[test]
fn test_classify_rate_limit() {
    let output = routekeeper(&["classify", "Too many requests", "--status", "429"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("class:       api_rate_limit"));
    assert!(out.contains("critical:    no"));
}

#[test]
fn test_classify_with_service_hint() {
    let output = routekeeper(&["classify", "boom", "--service", "map"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("class:       map"));
    assert!(out.contains("matched by:  service hint"));
}

#[test]
fn test_transitions_table() {
    let output = routekeeper(&["transitions"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("(6 allowed)"));
    assert!(out.contains("at_delivery"));
    assert!(out.contains("(terminal)"));
}

#[test]
fn test_config_init_and_show() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("config.ini");
    let path_str = path.to_str().unwrap();

    let output = routekeeper(&["config", "show", "--file", path_str]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("showing defaults"));

    let output = routekeeper(&["config", "init", "--file", path_str]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Created"));
    assert!(path.exists());

    let output = routekeeper(&["config", "init", "--file", path_str]);
    assert!(stdout(&output).contains("already exists"));

    let output = routekeeper(&["config", "show", "--file", path_str]);
    let out = stdout(&output);
    assert!(out.contains("[viewport]"));
    assert!(out.contains("debounce_ms = 350"));
    assert!(!out.contains("showing defaults"));
}

#[test]
fn test_config_show_invalid_value() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.ini");
    std::fs::write(&path, "[offline]\nmax_retries = 0\n").unwrap();

    let output = routekeeper(&["config", "show", "--file", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    let err = stderr(&output);
    assert!(err.contains("offline.max_retries"));
    assert!(err.contains("[offline]"));
}
