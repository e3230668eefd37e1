//! End-to-end tests for the team-bus CLI against a real database file.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn bus_cmd(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("team-bus").unwrap();
    cmd.arg("--db").arg(temp_dir.path().join("bus.sqlite"));
    cmd
}

fn register(temp_dir: &TempDir, agent: &str, role: &str) {
    bus_cmd(temp_dir)
        .args(["register", "--agent", agent, "--role", role])
        .assert()
        .success();
}

#[test]
fn test_init_creates_database() {
    let temp_dir = TempDir::new().unwrap();
    bus_cmd(&temp_dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("initialized bus"));
    assert!(temp_dir.path().join("bus.sqlite").exists());
}

#[test]
fn test_broadcast_fanout_scenario() {
    let temp_dir = TempDir::new().unwrap();
    register(&temp_dir, "lead", "lead");
    register(&temp_dir, "worker-1", "worker");
    register(&temp_dir, "worker-2", "worker");

    bus_cmd(&temp_dir)
        .args([
            "send", "--from", "lead", "--to", "all", "--kind", "task", "--body", "hello",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("fanout=2"));

    bus_cmd(&temp_dir)
        .args(["inbox", "--agent", "worker-1", "--unread"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello"));
}

#[test]
fn test_control_approve_scenario() {
    let temp_dir = TempDir::new().unwrap();
    register(&temp_dir, "lead", "lead");
    register(&temp_dir, "worker-1", "worker");

    bus_cmd(&temp_dir)
        .args([
            "control-request",
            "--type",
            "shutdown",
            "--from",
            "lead",
            "--to",
            "worker-1",
            "--body",
            "stop",
            "--request-id",
            "req-a1b2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("request_id=req-a1b2"));

    bus_cmd(&temp_dir)
        .args([
            "control-respond",
            "--request-id",
            "req-a1b2",
            "--from",
            "worker-1",
            "--approve",
            "--body",
            "ok",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("status=approved"));

    // worker-1 holds exactly one shutdown_request; lead exactly one
    // shutdown_response with the resolved state in meta.
    bus_cmd(&temp_dir)
        .args(["inbox", "--agent", "worker-1", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shutdown_request").count(1));
    bus_cmd(&temp_dir)
        .args(["inbox", "--agent", "lead", "--json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("shutdown_response")
                .count(1)
                .and(predicate::str::contains("\"state\":\"approved\""))
                .and(predicate::str::contains("\"request_id\":\"req-a1b2\"")),
        );

    // A second response is a conflict.
    bus_cmd(&temp_dir)
        .args([
            "control-respond",
            "--request-id",
            "req-a1b2",
            "--from",
            "worker-1",
            "--reject",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already resolved"));
}

#[test]
fn test_mark_read_reports_updates() {
    let temp_dir = TempDir::new().unwrap();
    register(&temp_dir, "lead", "lead");
    register(&temp_dir, "worker-1", "worker");

    bus_cmd(&temp_dir)
        .args([
            "send", "--from", "lead", "--to", "worker-1", "--kind", "task", "--body", "a",
        ])
        .assert()
        .success();

    bus_cmd(&temp_dir)
        .args(["mark-read", "--agent", "worker-1", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("marked_read=1"));

    bus_cmd(&temp_dir)
        .args(["mark-read", "--agent", "worker-1", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("marked_read=0"));
}

#[test]
fn test_send_rejects_bad_meta() {
    let temp_dir = TempDir::new().unwrap();
    register(&temp_dir, "lead", "lead");

    bus_cmd(&temp_dir)
        .args([
            "send", "--from", "lead", "--to", "all", "--body", "x", "--meta", "[1,2]",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("JSON object"));
}

#[test]
fn test_status_and_members_output() {
    let temp_dir = TempDir::new().unwrap();
    register(&temp_dir, "lead", "lead");
    register(&temp_dir, "worker-1", "worker");
    bus_cmd(&temp_dir)
        .args([
            "send", "--from", "lead", "--to", "worker-1", "--kind", "task", "--body", "x",
        ])
        .assert()
        .success();

    bus_cmd(&temp_dir)
        .args(["status"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("total_messages=1")
                .and(predicate::str::contains("unread[worker-1]=1")),
        );

    bus_cmd(&temp_dir)
        .args(["members"])
        .assert()
        .success()
        .stdout(predicate::str::contains("agent=worker-1 role=worker"));
}
