//! CLI tests for `em-core replay` and `em-core config`.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

/// em-core with an isolated config environment.
fn em_core(tmp: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("em-core");
    cmd.timeout(Duration::from_secs(60));
    cmd.env_remove("EM_CONFIG")
        .env("XDG_CONFIG_HOME", tmp.path().join("xdg"))
        .env("HOME", tmp.path())
        .env("EM_LOG", "error");
    cmd
}

// ============================================================================
// Replay
// ============================================================================

#[test]
fn test_replay_writes_durable_log_and_prints_stats() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("frames.jsonl");
    fs::write(
        &input,
        concat!(
            r#"{"timestamp_ms": 100000, "snapshot": {"gauges": {"app-001.3.executor.jvm.memory.used": 12345, "app-001.3.executor.jvm.memory.max": 99999}}}"#,
            "\n",
            r#"{"timestamp_ms": 101000, "snapshot": {"counters": {"app-001.3.executor.tasks": {"count": 1}}}}"#,
            "\n",
        ),
    )
    .unwrap();
    let out_dir = tmp.path().join("out");

    em_core(&tmp)
        .args(["replay", "--hostname", "replayhost", "--input"])
        .arg(&input)
        .arg("--directory")
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"frames\": 2"))
        .stdout(predicate::str::contains("\"rows_emitted\": 2"));

    let log = fs::read_to_string(out_dir.join("app-001").join("replayhost_3.json")).unwrap();
    let first: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
    assert_eq!(
        first,
        serde_json::json!({
            "timestamp": 100,
            "values": {"jvm": {"memory": {"used": 12345, "max": 99999}}},
            "host": "replayhost_3"
        })
    );
}

#[test]
fn test_replay_with_malformed_line_exits_partial() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("frames.jsonl");
    fs::write(
        &input,
        "not json\n{\"timestamp_ms\": 5000, \"snapshot\": {}}\n",
    )
    .unwrap();

    em_core(&tmp)
        .args(["replay", "--input"])
        .arg(&input)
        .arg("--directory")
        .arg(tmp.path().join("out"))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"skipped_lines\": 1"));
}

#[test]
fn test_replay_publish_to_unreachable_broker_counts_open_failure() {
    let tmp = TempDir::new().unwrap();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = tmp.path().join("em.toml");
    fs::write(
        &config,
        format!("[sink]\nkind = \"publish\"\nhost = \"127.0.0.1\"\nport = {}\n", port),
    )
    .unwrap();
    let input = tmp.path().join("frames.jsonl");
    fs::write(
        &input,
        concat!(
            r#"{"timestamp_ms": 1000, "snapshot": {"counters": {"app-1.1.s.a": {"count": 1}}}}"#,
            "\n",
        ),
    )
    .unwrap();

    em_core(&tmp)
        .arg("--config")
        .arg(&config)
        .args(["replay", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"sink_open_failures\": 1"))
        .stdout(predicate::str::contains("\"rows_emitted\": 0"));
}

#[test]
fn test_replay_publish_dry_run_counts_messages() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("em.toml");
    fs::write(&config, "[sink]\nkind = \"publish\"\nhost = \"broker\"\n").unwrap();
    let input = tmp.path().join("frames.jsonl");
    fs::write(
        &input,
        concat!(
            r#"{"timestamp_ms": 1000, "snapshot": {"counters": {"app-1.1.s.a": {"count": 1}}}}"#,
            "\n",
            r#"{"timestamp_ms": 2000, "snapshot": {"counters": {"app-1.1.s.a": {"count": 2}}}}"#,
            "\n",
        ),
    )
    .unwrap();

    em_core(&tmp)
        .arg("--config")
        .arg(&config)
        .args(["replay", "--dry-run", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"published\": 2"));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_show_prints_defaults() {
    let tmp = TempDir::new().unwrap();
    em_core(&tmp)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"sync_every\": 20"))
        .stdout(predicate::str::contains("\"rate_unit\": \"seconds\""));
}

#[test]
fn test_config_schema_describes_sink() {
    let tmp = TempDir::new().unwrap();
    em_core(&tmp)
        .args(["config", "schema"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sync_every"));
}

#[test]
fn test_config_validate_rejects_bad_file() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "sync_every = 0\n").unwrap();
    em_core(&tmp)
        .arg("--config")
        .arg(&config)
        .args(["config", "validate"])
        .assert()
        .code(10);
}
