//! End-to-end tests for the convo-sync binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn convo_sync() -> Command {
    Command::cargo_bin("convo-sync").unwrap()
}

#[test]
fn help_lists_commands() {
    convo_sync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("inspect"));
}

#[test]
fn simulate_then_inspect() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("state.json");

    convo_sync()
        .args(["simulate", "--events", "4", "--offline-after", "2", "--store"])
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 4 events"))
        .stdout(predicate::str::contains("Cursor: evt-4"));

    convo_sync()
        .args(["inspect", "--store"])
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("evt-4"))
        .stdout(predicate::str::contains("resume from cursor"));
}

#[test]
fn restart_resumes_numbering() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("state.json");

    convo_sync()
        .args(["simulate", "--events", "2", "--store"])
        .arg(&store)
        .assert()
        .success();

    convo_sync()
        .args(["simulate", "--events", "3", "--store"])
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("Cursor: evt-5"))
        .stdout(predicate::str::contains("Slow sync steps: 0"));
}

#[test]
fn failing_step_exits_with_error() {
    let dir = tempdir().unwrap();

    convo_sync()
        .args(["simulate", "--fail-step", "contacts", "--store"])
        .arg(dir.path().join("state.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("sync failed"));
}

#[test]
fn inspect_missing_store_fails() {
    let dir = tempdir().unwrap();

    convo_sync()
        .args(["inspect", "--store"])
        .arg(dir.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no sync state"));
}

#[test]
fn simulate_reads_config_file() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("convo-sync.toml");
    let store = dir.path().join("configured.json");
    std::fs::write(
        &config,
        format!(
            "[slow_sync]\nsteps = [\"self_user\", \"conversations\"]\n\n[store]\npath = {:?}\n",
            store.display().to_string()
        ),
    )
    .unwrap();

    convo_sync()
        .args(["simulate", "--events", "1", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Slow sync steps: 2"));

    assert!(store.exists());
}
