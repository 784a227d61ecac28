//! Integration tests for the `ferry` binary.

use std::io::Write;
use std::process::{Command, Output};

fn ferry(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ferry"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run ferry")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// ────────────────────────────────────────────────────────────────────────────
// describe
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_describe_single_type() {
    let output = ferry(&["describe", "Ticker"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.starts_with("class Ticker\n"));
    assert!(text.contains("event changed(int)"));
    assert!(!text.contains("class Calculator"));
}

#[test]
fn test_describe_json_lists_all_types() {
    let output = ferry(&["describe", "--json"]);
    assert!(output.status.success());
    let docs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = docs
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Calculator", "Matrix", "Imaging", "Ticker"]);
}

#[test]
fn test_describe_unknown_type_fails() {
    let output = ferry(&["describe", "Nope"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown type: Nope"));
}

// ────────────────────────────────────────────────────────────────────────────
// info and configuration
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_info_reports_config_and_thread_override() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[bridge]\nmax_external_buffer_len = 4096\n\n[workers]\nthreads = 8").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let output = ferry(&["--config", &path, "--threads", "3", "info"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("max buffer:     4096 bytes"));
    assert!(text.contains("threads:        3"));
    assert!(text.contains("Types:        Calculator, Matrix, Imaging, Ticker"));
}

#[test]
fn test_malformed_config_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[workers\nthreads = ").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let output = ferry(&["--config", &path, "info"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Config error"));
}

// ────────────────────────────────────────────────────────────────────────────
// demo
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_demo_events() {
    let output = ferry(&["--threads", "2", "demo", "events"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("event changed(3)\nevent finished()\n"));
}

#[test]
fn test_demo_all_runs_every_scenario() {
    let output = ferry(&["demo"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for header in ["# Calculator", "# Imaging", "# Events"] {
        assert!(text.contains(header), "missing {}", header);
    }
}
