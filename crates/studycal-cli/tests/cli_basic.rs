//! Basic CLI E2E tests.
//!
//! Each test runs the built `studycal` binary against its own temporary
//! data directory and checks the JSON it prints.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_studycal"))
        .args(args)
        .env("STUDYCAL_DATA_DIR", data_dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

/// Run a CLI command, expect success and parse its JSON output.
fn run_json(data_dir: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(data_dir, args);
    assert_eq!(code, 0, "CLI command failed: {args:?}\n{stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

fn add_task(data_dir: &Path, date: &str, title: &str) -> String {
    let task = run_json(
        data_dir,
        &["task", "add", "--student", "s1", "--date", date, "--subject", "Math", title],
    );
    task["id"].as_str().unwrap().to_string()
}

#[test]
fn test_task_add_and_list() {
    let dir = tempfile::tempdir().unwrap();
    let id = add_task(dir.path(), "2999-01-05", "Drill");

    let tasks = run_json(dir.path(), &["task", "list", "--student", "s1"]);
    let tasks = tasks.as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], id.as_str());
    assert_eq!(tasks[0]["status"], "normal");
    assert_eq!(tasks[0]["original_date"], "2999-01-05");
}

#[test]
fn test_task_complete_and_proof() {
    let dir = tempfile::tempdir().unwrap();
    let id = add_task(dir.path(), "2999-01-05", "Drill");

    let task = run_json(dir.path(), &["task", "complete", &id]);
    assert_eq!(task["completed"], true);

    let task = run_json(dir.path(), &["task", "proof", &id, "notes.pdf"]);
    assert_eq!(task["proof"], "notes.pdf");
}

#[test]
fn test_rollover_carries_over_small_backlog() {
    let dir = tempfile::tempdir().unwrap();
    let id = add_task(dir.path(), "2024-03-04", "Drill");

    let report = run_json(
        dir.path(),
        &["rollover", "run", "--student", "s1", "--date", "2024-03-04"],
    );
    assert_eq!(report["outcome"], "carried_over");
    assert_eq!(report["to"], "2024-03-05");

    let again = run_json(
        dir.path(),
        &["rollover", "run", "--student", "s1", "--date", "2024-03-04"],
    );
    assert_eq!(again["outcome"], "skipped");

    let task = run_json(dir.path(), &["task", "get", &id]);
    assert_eq!(task["date"], "2024-03-05");
    assert_eq!(task["status"], "carried_over");
}

#[test]
fn test_leave_request_and_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    add_task(dir.path(), "2999-01-05", "Drill");

    let outcome = run_json(
        dir.path(),
        &["leave", "request", "--student", "s1", "2999-01-05"],
    );
    assert_eq!(outcome["deferred_to"], "2999-01-06");

    let (_, stderr, code) = run_cli(
        dir.path(),
        &["leave", "request", "--student", "s1", "2999-01-05"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("error: Leave already requested for s1 on 2999-01-05"));

    let history = run_json(dir.path(), &["history", "list", "--student", "s1"]);
    assert_eq!(history[0]["operation"], "defer");
}

#[test]
fn test_past_leave_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(
        dir.path(),
        &["leave", "request", "--student", "s1", "2000-01-01"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("Cannot request leave for 2000-01-01"));
}

#[test]
fn test_rest_day_and_next_work_date() {
    let dir = tempfile::tempdir().unwrap();
    run_json(dir.path(), &["task", "rest", "--student", "s1", "2024-03-05"]);

    let rest = run_json(
        dir.path(),
        &["calendar", "is-rest", "--student", "s1", "2024-03-05"],
    );
    assert_eq!(rest["rest_day"], true);

    let next = run_json(
        dir.path(),
        &["calendar", "next-work-date", "--student", "s1", "2024-03-04"],
    );
    assert_eq!(next["next_work_date"], "2024-03-06");
}

#[test]
fn test_threshold_override() {
    let dir = tempfile::tempdir().unwrap();
    run_json(
        dir.path(),
        &["threshold", "set", "carry_over_threshold", "5", "--student", "s1"],
    );

    let thresholds = run_json(dir.path(), &["threshold", "get", "--student", "s1"]);
    assert_eq!(thresholds["carry_over_threshold"], 5);
    assert_eq!(thresholds["daily_task_limit"], 10);

    let (_, _, code) = run_cli(dir.path(), &["threshold", "set", "bogus", "1"]);
    assert_ne!(code, 0);
}

#[test]
fn test_config_get_set() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "engine.max_cascade_depth"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "50");

    let (_, _, code) = run_cli(dir.path(), &["config", "set", "engine.max_cascade_depth", "20"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(dir.path(), &["config", "get", "engine.max_cascade_depth"]);
    assert_eq!(stdout.trim(), "20");

    let (_, stderr, code) = run_cli(dir.path(), &["config", "get", "engine.nope"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown config key"));
}

#[test]
fn test_config_rejects_window_past_duration_range() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(
        dir.path(),
        &["config", "set", "engine.idempotency_window_secs", "9223372036854776"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("engine.idempotency_window_secs"));

    let (stdout, _, _) = run_cli(dir.path(), &["config", "get", "engine.idempotency_window_secs"]);
    assert_eq!(stdout.trim(), "300");
    run_json(dir.path(), &["task", "list", "--student", "s1"]);
}
