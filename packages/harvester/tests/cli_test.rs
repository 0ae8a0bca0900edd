//! CLI-level tests exercising the binary through its argument surface.

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd() -> Command {
    #[allow(clippy::expect_used)]
    Command::cargo_bin("oai-harvester").expect("binary exists")
}

#[test]
fn test_help_lists_harvest_command() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("harvest"));
}

#[test]
fn test_harvest_help_lists_options() {
    cmd()
        .args(["harvest", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--rotate-every"))
        .stdout(predicate::str::contains("--max-items"))
        .stdout(predicate::str::contains("--export"));
}

#[test]
fn test_missing_url_fails() {
    cmd()
        .arg("harvest")
        .assert()
        .failure()
        .stderr(predicate::str::contains("URL"));
}

#[test]
fn test_invalid_verb_fails() {
    cmd()
        .args(["harvest", "https://example.org/oai", "--verb", "ListEverything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown OAI-PMH verb"));
}

#[test]
fn test_invalid_export_mode_fails() {
    cmd()
        .args(["harvest", "https://example.org/oai", "--export", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown export mode"));
}

#[test]
fn test_invalid_url_fails_before_any_request() {
    cmd()
        .args(["harvest", "not a url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid endpoint URL"));
}

#[test]
fn test_invalid_date_fails() {
    cmd()
        .args(["harvest", "https://example.org/oai", "--from", "01-01-2024"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid date"));
}
