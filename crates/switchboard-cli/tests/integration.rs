#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn switchboard(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("switchboard").unwrap();
    cmd.current_dir(dir.path())
        .env("SWITCHBOARD_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn json_of(dir: &TempDir, args: &[&str]) -> Value {
    let out = switchboard(dir)
        .arg("--json")
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&out).unwrap()
}

const TWO_CHANNELS: &str = "\
channels:
  - id: move2japan
    name: Move2Japan
    resource: chrome
  - id: undaodu
    name: UnDaoDu
    resource: edge
priorities:
  escalate: [comment_backlog]
";

fn init_with_channels(dir: &TempDir) {
    switchboard(dir).arg("init").assert().success();
    std::fs::write(dir.path().join(".switchboard/config.yaml"), TWO_CHANNELS).unwrap();
}

// ---------------------------------------------------------------------------
// switchboard init / config
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_store() {
    let dir = TempDir::new().unwrap();
    switchboard(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .switchboard/config.yaml"));

    assert!(dir.path().join(".switchboard/config.yaml").exists());
    assert!(dir.path().join(".switchboard/breadcrumbs.db").exists());
    assert!(dir.path().join(".switchboard/.gitignore").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    switchboard(&dir).arg("init").assert().success();
    switchboard(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .switchboard/config.yaml"));
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    switchboard(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("switchboard init"));
}

#[test]
fn validate_warns_about_missing_channels() {
    let dir = TempDir::new().unwrap();
    switchboard(&dir).arg("init").assert().success();
    switchboard(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[warning] no channels configured"));
}

#[test]
fn validate_fails_on_duplicate_channels() {
    let dir = TempDir::new().unwrap();
    switchboard(&dir).arg("init").assert().success();
    std::fs::write(
        dir.path().join(".switchboard/config.yaml"),
        "channels:\n  - {id: a, name: A}\n  - {id: a, name: A again}\n",
    )
    .unwrap();
    switchboard(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}

#[test]
fn duplicate_channels_block_rotation() {
    let dir = TempDir::new().unwrap();
    switchboard(&dir).arg("init").assert().success();
    std::fs::write(
        dir.path().join(".switchboard/config.yaml"),
        "channels:\n  - {id: a, name: A}\n  - {id: a, name: A2}\n",
    )
    .unwrap();
    switchboard(&dir)
        .args(["rotation", "next"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate channel id: a"));
}

#[test]
fn config_show_prints_defaults() {
    let dir = TempDir::new().unwrap();
    switchboard(&dir).arg("init").assert().success();
    let cfg = json_of(&dir, &["config", "show"]);
    assert_eq!(cfg["queue"]["max_len"], 64);
    assert_eq!(cfg["event_log"]["retention_days"], 30);
}

// ---------------------------------------------------------------------------
// switchboard priority
// ---------------------------------------------------------------------------

#[test]
fn priority_resolves_builtin_and_default() {
    let dir = TempDir::new().unwrap();
    let known = json_of(&dir, &["priority", "linkedin_notification"]);
    assert_eq!(known["priority"], "p2");
    assert_eq!(known["origin"], "built-in");

    let unknown = json_of(&dir, &["priority", "mystery_signal"]);
    assert_eq!(unknown["priority"], "p3");
    assert_eq!(unknown["origin"], "default");
}

#[test]
fn priority_strict_rejects_unknown() {
    let dir = TempDir::new().unwrap();
    switchboard(&dir)
        .args(["priority", "mystery_signal", "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown signal type"));
}

// ---------------------------------------------------------------------------
// switchboard rotation
// ---------------------------------------------------------------------------

#[test]
fn rotation_progress_survives_invocations() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);

    let first = json_of(&dir, &["rotation", "next"]);
    assert_eq!(first["channel_id"], "move2japan");
    assert_eq!(first["phase"], "p1");
    assert_eq!(first["recommended_resource"], "chrome");

    for _ in 0..3 {
        switchboard(&dir)
            .args(["rotation", "complete", "move2japan", "--phase", "p1"])
            .assert()
            .success();
    }

    let next = json_of(&dir, &["rotation", "next"]);
    assert_eq!(next["channel_id"], "undaodu");
    assert_eq!(next["phase"], "p1");
    assert!(dir.path().join(".switchboard/rotation.yaml").exists());
}

#[test]
fn rotation_complete_records_counters() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);
    switchboard(&dir)
        .args(["rotation", "complete", "undaodu", "--set", "comments_remaining=4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("undaodu: p1 -> p2"));

    let status = json_of(&dir, &["rotation", "status"]);
    assert_eq!(status["channels"][1]["phase"], "p2");
    assert_eq!(status["channels"][1]["counters"]["comments_remaining"], 4);
}

#[test]
fn rotation_complete_unknown_channel_fails() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);
    switchboard(&dir)
        .args(["rotation", "complete", "nobody"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown channel: nobody"));
}

#[test]
fn rotation_reset_returns_to_p1() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);
    switchboard(&dir)
        .args(["rotation", "complete", "move2japan"])
        .assert()
        .success();
    switchboard(&dir).args(["rotation", "reset"]).assert().success();
    let status = json_of(&dir, &["rotation", "status"]);
    assert_eq!(status["channels"][0]["phase"], "p1");
}

#[test]
fn urgent_marker_interrupts_rotation() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);
    std::fs::write(dir.path().join(".switchboard/urgent"), "").unwrap();
    let next = json_of(&dir, &["rotation", "next"]);
    assert_eq!(next["next_activity"]["kind"], "interrupt");
    assert_eq!(next["next_activity"]["activity"], "live_chat");
}

// ---------------------------------------------------------------------------
// switchboard signal
// ---------------------------------------------------------------------------

#[test]
fn critical_signal_executes() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);
    let out = json_of(&dir, &["signal", "oauth_reauth", "--source", "auth"]);
    assert_eq!(out["decision"]["action"], "EXECUTE");
    assert_eq!(out["decision"]["signal"]["priority"], "p0");
    assert_eq!(out["result"]["success"], true);
}

#[test]
fn escalated_signal_is_not_executed() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);
    let out = json_of(&dir, &["signal", "comment_backlog"]);
    assert_eq!(out["decision"]["action"], "ESCALATE");
    assert!(out["result"].is_null());
}

#[test]
fn phase_complete_signal_advances_rotation() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);
    let out = json_of(
        &dir,
        &[
            "signal",
            "channel_phase_complete",
            "--meta",
            "channel_id=undaodu",
            "--meta",
            "videos_scheduled=2",
        ],
    );
    assert_eq!(out["decision"]["recommended_resource"], "edge");
    assert_eq!(out["result"]["outcome"]["new_phase"], "p2");

    let status = json_of(&dir, &["rotation", "status"]);
    assert_eq!(status["channels"][1]["phase"], "p2");
}

#[test]
fn failing_handler_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);
    switchboard(&dir)
        .args(["signal", "channel_phase_complete", "--meta", "channel_id=ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown channel 'ghost'"));
}

#[test]
fn bad_meta_pair_is_rejected() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);
    switchboard(&dir)
        .args(["signal", "video_indexing", "--meta", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}

// ---------------------------------------------------------------------------
// switchboard crumbs / status
// ---------------------------------------------------------------------------

#[test]
fn signals_leave_breadcrumbs() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);
    let out = json_of(&dir, &["signal", "video_indexing", "--source", "indexer"]);
    let execution_id = out["decision"]["signal"]["execution_id"]
        .as_str()
        .unwrap()
        .to_string();

    let count = json_of(&dir, &["crumbs", "count", "signal_received"]);
    assert_eq!(count["count"], 1);

    let session = json_of(&dir, &["crumbs", "session", &execution_id]);
    let events: Vec<&str> = session
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(events, vec!["signal_received", "signal_outcome"]);
}

#[test]
fn repeated_signals_show_as_pattern() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);
    for _ in 0..3 {
        switchboard(&dir)
            .args(["signal", "metadata_refresh", "--dry-run"])
            .assert()
            .success();
    }
    let groups = json_of(&dir, &["crumbs", "patterns", "--min", "3"]);
    let groups = groups.as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["event_type"], "signal_received");
    assert_eq!(groups[0]["count"], 3);
}

#[test]
fn purge_keeps_recent_breadcrumbs() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);
    switchboard(&dir)
        .args(["signal", "x_notification"])
        .assert()
        .success();
    let purge = json_of(&dir, &["crumbs", "purge"]);
    assert_eq!(purge["deleted"], 0);
    let recent = json_of(&dir, &["crumbs", "recent"]);
    assert!(!recent.as_array().unwrap().is_empty());
}

#[test]
fn status_summarizes_activity() {
    let dir = TempDir::new().unwrap();
    init_with_channels(&dir);
    switchboard(&dir)
        .args(["signal", "oauth_reauth"])
        .assert()
        .success();
    let status = json_of(&dir, &["status"]);
    assert_eq!(status["activity_24h"]["signal_received"], 1);
    assert_eq!(status["activity_24h"]["signal_outcome"], 1);
    assert_eq!(status["failures_24h"], 0);
    assert_eq!(status["rotation"]["channels"].as_array().unwrap().len(), 2);
}
