//! CLI integration tests using assert_cmd.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tutor() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("tutor").unwrap()
}

fn catalogue() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../content/algebra.toml")
}

/// A config that grades with the offline mock provider.
fn mock_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let config = format!(
        r#"default_provider = "mock"

[session]
content = '{}'
seed = 7

[storage]
database = "tutor.db"
write_retries = 1
retry_delay_ms = 0
"#,
        catalogue().display()
    );
    std::fs::write(dir.path().join("tutor.toml"), config).unwrap();
    dir
}

#[test]
fn help_output() {
    tutor()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Adaptive tutoring sessions"));
}

#[test]
fn version_output() {
    tutor()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tutor"));
}

#[test]
fn validate_sample_catalogue() {
    tutor()
        .arg("validate")
        .arg("--content")
        .arg(catalogue())
        .assert()
        .success()
        .stdout(predicate::str::contains("3 topics"))
        .stdout(predicate::str::contains("All topics valid"));
}

#[test]
fn validate_reports_broken_topics() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(
        &path,
        r#"
[[topics]]
id = "empty"
name = "Empty"
prerequisites = ["nowhere"]

[topics.explanations]
procedural = "Nothing to practise."
"#,
    )
    .unwrap();

    tutor()
        .arg("validate")
        .arg("--content")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[empty] SKIPPED: empty problem pool"))
        .stdout(predicate::str::contains("'nowhere' is not in the catalogue"))
        .stdout(predicate::str::contains("1 topic(s) will be skipped"));
}

#[test]
fn validate_nonexistent_file() {
    tutor()
        .arg("validate")
        .arg("--content")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    tutor()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created tutor.toml"))
        .stdout(predicate::str::contains("Created topics.toml"));

    assert!(dir.path().join("tutor.toml").exists());
    assert!(dir.path().join("topics.toml").exists());

    // The starter config points at the starter catalogue.
    tutor()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 topics"))
        .stdout(predicate::str::contains("All topics valid"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    tutor().current_dir(dir.path()).arg("init").assert().success();

    tutor()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn reports_on_empty_database() {
    let dir = mock_workspace();

    tutor()
        .current_dir(dir.path())
        .args(["due", "--student", "ana"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing due for review"));

    tutor()
        .current_dir(dir.path())
        .args(["progress", "--student", "ana"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No progress recorded for ana"));

    tutor()
        .current_dir(dir.path())
        .args(["history", "--student", "ana"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No sessions recorded for ana"));
}

#[test]
fn history_rejects_unknown_format() {
    let dir = mock_workspace();

    tutor()
        .current_dir(dir.path())
        .args(["history", "--student", "ana", "--format", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown format"));
}

#[test]
fn session_with_mock_provider_saves_progress() {
    let dir = mock_workspace();

    // Ready, three answers, then end of input at the next introduction.
    tutor()
        .current_dir(dir.path())
        .args(["session", "--student", "ana"])
        .write_stdin("\n5\n7\n24\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("== One-Step Equations =="))
        .stdout(predicate::str::contains("Grade 4/5. Good work. Keep going!"))
        .stdout(predicate::str::contains("One-Step Equations is now in review"))
        .stdout(predicate::str::contains("== Two-Step Equations =="))
        .stdout(predicate::str::contains("Session summary (abandoned)"));

    tutor()
        .current_dir(dir.path())
        .args(["progress", "--student", "ana"])
        .assert()
        .success()
        .stdout(predicate::str::contains("one_step_equations"))
        .stdout(predicate::str::contains("0 learning, 1 in review, 0 mastered"));

    // The first review falls tomorrow.
    tutor()
        .current_dir(dir.path())
        .args(["due", "--student", "ana"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing due for review"));

    tutor()
        .current_dir(dir.path())
        .args(["history", "--student", "ana", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"outcome\": \"abandoned\""))
        .stdout(predicate::str::contains("one_step_equations"));
}

#[test]
fn session_with_missing_catalogue_fails() {
    let dir = mock_workspace();

    tutor()
        .current_dir(dir.path())
        .args(["session", "--student", "ana", "--content", "missing.toml"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to start session"));
}
