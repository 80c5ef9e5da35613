#![allow(clippy::single_match_else, clippy::uninlined_format_args)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use rusqlite::Connection;
use serde_json::Value;
use ulid::Ulid;

fn twod_binary_path() -> PathBuf {
    match std::env::var("CARGO_BIN_EXE_twod") {
        Ok(value) => PathBuf::from(value),
        Err(_) => {
            let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../target/debug/twod");
            if !path.exists() {
                let status = Command::new("cargo")
                    .args(["build", "-p", "twod-forecast-cli", "--bin", "twod"])
                    .status();
                match status {
                    Ok(value) if value.success() => {}
                    Ok(value) => panic!("failed to build twod binary (status={value})"),
                    Err(err) => panic!("failed to invoke cargo build: {err}"),
                }
            }
            path
        }
    }
}

struct TempDb {
    path: PathBuf,
}

impl TempDb {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("twod-cli-{}.sqlite3", Ulid::new()));
        Self { path }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut raw = self.path.clone().into_os_string();
            raw.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(raw));
        }
    }
}

fn twod_output(db_path: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(twod_binary_path());
    command.arg("--db").arg(db_path).env_remove("TWOD_LOG");
    for arg in args {
        command.arg(arg);
    }

    match command.output() {
        Ok(output) => output,
        Err(err) => panic!("failed to run twod command {:?}: {err}", args),
    }
}

fn twod_output_with_stdin(db_path: &Path, args: &[&str], stdin: &str) -> Output {
    let mut command = Command::new(twod_binary_path());
    command
        .arg("--db")
        .arg(db_path)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => panic!("failed to spawn twod command {:?}: {err}", args),
    };
    match child.stdin.take() {
        Some(mut handle) => {
            if let Err(err) = handle.write_all(stdin.as_bytes()) {
                panic!("failed to write stdin: {err}");
            }
        }
        None => panic!("stdin was not piped"),
    }
    match child.wait_with_output() {
        Ok(output) => output,
        Err(err) => panic!("failed to wait for twod command {:?}: {err}", args),
    }
}

fn stdout_json(output: &Output) -> Value {
    match serde_json::from_slice::<Value>(&output.stdout) {
        Ok(value) => value,
        Err(err) => panic!(
            "failed to parse stdout as JSON: {err}\nstdout={}\nstderr={}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ),
    }
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed\nstdout={}\nstderr={}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn add_record(db_path: &Path, date: &str, am: &str, pm: &str) -> Value {
    let output = twod_output(
        db_path,
        &["record", "add", "--date", date, "--am", am, "--pm", pm, "--json"],
    );
    assert_success(&output);
    stdout_json(&output)
}

#[test]
fn help_lists_expected_subcommands() {
    let output = match Command::new(twod_binary_path()).arg("--help").output() {
        Ok(value) => value,
        Err(err) => panic!("failed to run help command: {err}"),
    };

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for required in [
        "record",
        "import",
        "predict",
        "scenario",
        "weights",
        "backtest",
        "credential",
        "ruleset",
    ] {
        assert!(stdout.contains(required), "missing subcommand {required}");
    }
}

#[test]
fn record_add_then_list_returns_newest_first() {
    let db = TempDb::new();
    add_record(&db.path, "2026-01-22", "42", "44");
    let added = add_record(&db.path, "2026-01-23", "43", "91");

    assert_eq!(added["record"]["date"], "2026-01-23");
    assert_eq!(added["record"]["am"], "43");
    assert_eq!(added["record"]["pm"], "91");

    let listed = stdout_json(&twod_output(&db.path, &["record", "list", "--json"]));
    let Some(rows) = listed.as_array() else {
        panic!("expected array, got {listed}");
    };
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["date"], "2026-01-23");
    assert_eq!(rows[1]["date"], "2026-01-22");
}

#[test]
fn record_add_rejects_out_of_range_values() {
    let db = TempDb::new();
    let output = twod_output(
        &db.path,
        &["record", "add", "--date", "2026-01-23", "--am", "100", "--pm", "01"],
    );
    assert!(!output.status.success());
}

#[test]
fn import_from_stdin_reports_counts() {
    let db = TempDb::new();
    let output = twod_output_with_stdin(
        &db.path,
        &["import", "--file", "-", "--json"],
        "2026-01-23\n11:00 AM\n43\n04:30 PM\n91\n",
    );
    assert_success(&output);
    let report = stdout_json(&output);
    assert_eq!(report["imported"], 1);
    assert_eq!(report["errors"].as_array().map(Vec::len), Some(0));

    let latest = stdout_json(&twod_output(&db.path, &["record", "latest", "--json"]));
    assert_eq!(latest["am"], "43");
    assert_eq!(latest["pm"], "91");
}

#[test]
fn import_of_bare_pair_reports_error() {
    let db = TempDb::new();
    let output = twod_output_with_stdin(&db.path, &["import", "--file", "-", "--json"], "43");
    assert_success(&output);
    let report = stdout_json(&output);
    assert_eq!(report["imported"], 0);
    assert_eq!(report["errors"][0]["code"], "result_without_date");
}

#[test]
fn predict_with_short_history_returns_empty_ranking() {
    let db = TempDb::new();
    add_record(&db.path, "2026-01-23", "43", "91");

    let output = twod_output(&db.path, &["predict", "--seed", "1", "--json"]);
    assert_success(&output);
    let payload = stdout_json(&output);
    assert_eq!(payload["target_date"], "2026-01-24");
    assert_eq!(payload["prediction"]["high_confidence"], Value::Array(Vec::new()));
    assert_eq!(payload["fusion"]["external_available"], false);
    assert_eq!(
        payload["prediction"]["meta"]["degraded"],
        serde_json::json!(["external ranking unavailable"])
    );
    let insight = payload["prediction"]["insights"][0].as_str().unwrap_or_default();
    assert!(insight.contains("Not enough history"));
    assert!(payload["external_prompt"]
        .as_str()
        .unwrap_or_default()
        .starts_with("2026-01-23 (Fri): AM=43, PM=91"));
}

#[test]
fn predict_ranks_once_history_is_sufficient() {
    let db = TempDb::new();
    for (date, am, pm) in [
        ("2026-01-19", "45", "05"),
        ("2026-01-20", "31", "76"),
        ("2026-01-21", "71", "68"),
        ("2026-01-22", "42", "44"),
        ("2026-01-23", "43", "91"),
    ] {
        add_record(&db.path, date, am, pm);
    }

    let payload = stdout_json(&twod_output(
        &db.path,
        &["predict", "--date", "2026-01-24", "--seed", "7", "--json"],
    ));
    let high = payload["prediction"]["high_confidence"]
        .as_array()
        .map_or(0, Vec::len);
    assert!(high > 0);
    assert_eq!(payload["prediction"]["meta"]["analyzed_count"], 5);
}

#[test]
fn predict_with_external_answer_is_not_degraded() {
    let db = TempDb::new();
    add_record(&db.path, "2026-01-23", "43", "91");
    let answer_path = std::env::temp_dir().join(format!("twod-answer-{}.json", Ulid::new()));
    if let Err(err) = std::fs::write(&answer_path, r#"{"top_picks": ["45", "09"]}"#) {
        panic!("failed to write external answer: {err}");
    }

    let output = twod_output(
        &db.path,
        &[
            "predict",
            "--seed",
            "1",
            "--external-json",
            &answer_path.to_string_lossy(),
            "--json",
        ],
    );
    let _ = std::fs::remove_file(&answer_path);
    assert_success(&output);
    let payload = stdout_json(&output);
    assert_eq!(payload["fusion"]["external_available"], true);
    assert_eq!(payload["prediction"]["meta"]["degraded"], serde_json::json!([]));
    assert_eq!(payload["fusion"]["picks"][0]["number"], "45");
}

#[test]
fn weights_show_sums_to_one() {
    let db = TempDb::new();
    let weights = stdout_json(&twod_output(&db.path, &["weights", "show", "--json"]));
    let Some(map) = weights.as_object() else {
        panic!("expected object, got {weights}");
    };
    let total: f64 = map.values().filter_map(Value::as_f64).sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(map.contains_key("recency"));
}

#[test]
fn adaptation_history_grows_after_record_add() {
    let db = TempDb::new();
    add_record(&db.path, "2026-01-22", "42", "44");
    add_record(&db.path, "2026-01-23", "43", "91");

    let history = stdout_json(&twod_output(
        &db.path,
        &["weights", "history", "--limit", "10", "--json"],
    ));
    let Some(entries) = history.as_array() else {
        panic!("expected array, got {history}");
    };
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0]["session"], "evening");
    assert_eq!(entries[0]["draw_date"], "2026-01-23");
    assert_eq!(entries[1]["session"], "morning");
    // nothing to judge the oldest record against
    assert_eq!(entries[3]["draw_date"], "2026-01-22");
    assert_eq!(entries[3]["changed"], false);

    let conn = match Connection::open(&db.path) {
        Ok(conn) => conn,
        Err(err) => panic!("failed to open db: {err}"),
    };
    let deleted = conn.execute("DELETE FROM weight_adaptations", []);
    assert!(deleted.is_err());
}

#[test]
fn record_clear_requires_confirmation() {
    let db = TempDb::new();
    add_record(&db.path, "2026-01-23", "43", "91");

    assert!(!twod_output(&db.path, &["record", "clear"]).status.success());
    assert_success(&twod_output(&db.path, &["record", "clear", "--yes"]));
    let latest = stdout_json(&twod_output(&db.path, &["record", "latest", "--json"]));
    assert_eq!(latest, Value::Null);
}

#[test]
fn credential_show_masks_secret() {
    let db = TempDb::new();
    assert_success(&twod_output(
        &db.path,
        &["credential", "set", "--value", "sk-abcdef123456"],
    ));
    let output = twod_output(&db.path, &["credential", "show"]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("****3456"));
    assert!(!stdout.contains("abcdef"));
}

#[test]
fn ruleset_show_returns_v1_defaults() {
    let db = TempDb::new();
    let ruleset = stdout_json(&twod_output(&db.path, &["ruleset", "show"]));
    assert_eq!(ruleset["ruleset_version"], 1);
    assert_eq!(ruleset["confidence_cap"].as_f64(), Some(99.0));
}

#[test]
fn backtest_reports_contract_version() {
    let db = TempDb::new();
    let output = twod_output(&db.path, &["backtest", "--days", "5", "--json"]);
    assert_success(&output);
    let report = stdout_json(&output);
    assert_eq!(report["contract_version"], "backtest_report.v1");
    assert_eq!(report["evaluated"], 0);
}
