//! Integration tests for headless mode, through the built binary.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Runs the binary with an isolated config path so a user's own config
/// file never leaks into the test.
fn run_headless(args: &[&str]) -> (i32, String, String) {
    run_headless_with_stdin(args, None)
}

fn run_headless_with_stdin(args: &[&str], stdin: Option<&str>) -> (i32, String, String) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = dir.path().join("absent.toml");

    let mut child = Command::new(env!("CARGO_BIN_EXE_queryview"))
        .arg("--config")
        .arg(&config)
        .args(args)
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to execute command");

    if let Some(input) = stdin {
        let mut pipe = child.stdin.take().expect("stdin is piped");
        pipe.write_all(input.as_bytes()).expect("Failed to write stdin");
    }
    drop(child.stdin.take());

    let output = child.wait_with_output().expect("Failed to wait for command");
    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    (exit_code, stdout, stderr)
}

#[test]
fn test_headless_basic_execution() {
    let (code, stdout, _) = run_headless(&["--events", "settle,execute,settle"]);

    assert_eq!(code, 0, "Expected exit code 0");
    assert!(stdout.contains("Daily signups"));
    assert!(stdout.contains("Status: succeeded #1"));
    assert!(stdout.contains("Events: 3 executed"));
}

#[test]
fn test_headless_assertions_pass() {
    let (code, stdout, _) = run_headless(&[
        "--events",
        "settle,execute,settle,assert:state:state=succeeded,assert:state:row_count>=3",
        "--output",
        "json",
    ]);

    assert_eq!(code, 0);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["assertions"]["passed"], 2);
    assert_eq!(parsed["assertions"]["failed"], 0);
    assert_eq!(parsed["state"]["state"], "succeeded");
}

#[test]
fn test_headless_assertion_fail() {
    let (code, stdout, _) = run_headless(&[
        "--events",
        "assert:state:state=succeeded",
        "--output",
        "json",
    ]);

    assert_eq!(code, 1, "Should exit with code 1 on assertion failure");
    assert!(stdout.contains(r#""passed": 0"#));
    assert!(stdout.contains(r#""failed": 1"#));
}

#[test]
fn test_headless_dirty_parameters_gate() {
    let (code, stdout, _) = run_headless(&[
        "--events",
        "settle,param:region=us,execute,assert:contains:parameters_dirty,apply,settle,assert:state:parameters.region=us",
    ]);

    assert_eq!(code, 0, "stdout: {stdout}");
    assert!(stdout.contains("Assertions: 2 passed, 0 failed"));
}

#[test]
fn test_headless_cancel_timeout() {
    let (code, stdout, _) = run_headless(&[
        "--mock-latency-ms",
        "60000",
        "--mock-ignore-cancel",
        "--cancel-timeout-ms",
        "200",
        "--events",
        "settle,execute,cancel,settle,assert:state:state=failed,assert:contains:not acknowledged within 200ms",
    ]);

    assert_eq!(code, 0, "stdout: {stdout}");
}

#[test]
fn test_headless_read_only_flag() {
    let (code, stdout, _) = run_headless(&[
        "--read-only",
        "--events",
        "settle,describe:hello,assert:contains:Query is not editable,assert:state:flags.can_edit=false",
    ]);

    assert_eq!(code, 0, "stdout: {stdout}");
}

#[test]
fn test_headless_query_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let fixture: PathBuf = dir.path().join("query.json");
    std::fs::write(
        &fixture,
        r#"{"id": 5, "name": "Orders", "query": "SELECT * FROM orders", "data_source_id": 2}"#,
    )
    .unwrap();

    let (code, stdout, _) = run_headless(&[
        "--query",
        fixture.to_str().unwrap(),
        "--events",
        "settle,assert:state:title=Orders,assert:state:visualizations=[]",
    ]);

    assert_eq!(code, 0, "stdout: {stdout}");
}

#[test]
fn test_headless_script_from_stdin() {
    let script = "# two runs\nsettle\nexecute\nsettle\nexecute:bypass\nsettle\nassert:state:token=2\n";
    let (code, stdout, _) = run_headless_with_stdin(&["--script", "-"], Some(script));

    assert_eq!(code, 0, "stdout: {stdout}");
    assert!(stdout.contains("Status: succeeded #2"));
}

#[test]
fn test_headless_invalid_event() {
    let (code, _, stderr) = run_headless(&["--events", "explode"]);

    assert_eq!(code, 2);
    assert!(stderr.contains("Configuration Error"));
    assert!(stderr.contains("Unknown event type"));
}

#[test]
fn test_headless_requires_events() {
    let (code, _, stderr) = run_headless(&[]);

    assert_eq!(code, 2);
    assert!(stderr.contains("--events or --script is required"));
}

#[test]
fn test_headless_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("report.json");

    let (code, stdout, _) = run_headless(&[
        "--events",
        "settle",
        "--output",
        "json",
        "--output-file",
        out.to_str().unwrap(),
    ]);

    assert_eq!(code, 0);
    assert!(stdout.is_empty());
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(report["events_executed"], 1);
}
