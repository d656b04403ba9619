//! Smoke tests for the `tollgate` binary.
//!
//! Exercises CLI dispatch, stdin ingestion, and the structured decision
//! output with the judgment service stubbed; no network or credentials.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn tollgate() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tollgate"))
}

/// Write a config pointing all file-resident state into the temp dir.
fn write_config(dir: &TempDir) -> PathBuf {
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[model]
provider = "stub"

[cache]
path = "{}"

[audit]
path = "{}"
"#,
            dir.path().join("cache.json").display(),
            dir.path().join("decisions.jsonl").display(),
        ),
    )
    .unwrap();
    config_path
}

fn evaluate(config: &Path, payload: &str) -> Output {
    let mut child = tollgate()
        .args(["--config", config.to_str().unwrap(), "evaluate"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn tollgate");
    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(payload.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn decision(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).unwrap_or_else(|_| panic!("bad stdout: {stdout}"))
}

#[test]
fn binary_responds_to_help() {
    let output = tollgate().arg("--help").output().expect("failed to execute tollgate");
    assert!(output.status.success(), "tollgate --help should exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("evaluate"), "help should list evaluate subcommand");
    assert!(stdout.contains("cache"), "help should list cache subcommand");
}

#[test]
fn allow_listed_tool_prints_allow() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let output = evaluate(
        &config,
        r#"{"tool_name": "Read", "tool_input": {"path": "/any/file"}}"#,
    );
    assert!(output.status.success());

    let json = decision(&output);
    assert_eq!(json["eventName"], "PermissionRequest");
    assert_eq!(json["decision"]["behavior"], "allow");
}

#[test]
fn destructive_command_prints_deny() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let output = evaluate(
        &config,
        r#"{"tool_name": "Bash", "tool_input": {"command": "rm -rf /"}}"#,
    );
    assert!(output.status.success());

    let json = decision(&output);
    assert_eq!(json["decision"]["behavior"], "deny");
    assert!(
        json["decision"]["message"]
            .as_str()
            .unwrap()
            .contains("destructive"),
    );
}

#[test]
fn passthrough_tool_prints_nothing() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let output = evaluate(&config, r#"{"tool_name": "AskUserQuestion", "tool_input": {}}"#);
    assert!(output.status.success());
    assert!(
        output.stdout.is_empty(),
        "passthrough must produce no structured output"
    );
}

#[test]
fn malformed_input_prints_fixed_deny() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let output = evaluate(&config, "this is not a request");
    assert!(output.status.success());

    let json = decision(&output);
    assert_eq!(json["decision"]["behavior"], "deny");
    assert_eq!(json["decision"]["message"], "malformed permission request");
}

#[test]
fn audit_log_records_each_decision() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    evaluate(&config, r#"{"tool_name": "Read", "tool_input": {"path": "/f"}}"#);
    evaluate(&config, r#"{"tool_name": "AskUserQuestion", "tool_input": {}}"#);

    let log = std::fs::read_to_string(dir.path().join("decisions.jsonl")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2, "one record per decided request");
    assert!(lines[0].contains("\"allow\""));
    assert!(lines[1].contains("\"passthrough\""));
}

#[test]
fn cache_clear_reports_count() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let output = tollgate()
        .args(["--config", config.to_str().unwrap(), "cache", "clear"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("removed 0"));
}

#[test]
fn stub_provider_denies_unmatched_tools() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    // Unknown tool defers past the fast tier and hits the stub arbiter.
    let output = evaluate(&config, r#"{"tool_name": "Edit", "tool_input": {"file_path": "x"}}"#);
    let json = decision(&output);
    assert_eq!(json["decision"]["behavior"], "deny");
}
