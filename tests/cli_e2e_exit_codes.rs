//! End-to-end tests for CLI exit codes.
//!
//! - Exit code 0: success
//! - Exit code 1: any error, including a sync in which a repository failed
//! - Exit code 2: invalid command-line usage (handled by clap)

mod common;
use common::prelude::*;

#[test]
fn test_exit_code_help_and_version() {
    cargo_bin_cmd!("repo-fleet").arg("--help").assert().code(0);
    cargo_bin_cmd!("repo-fleet").arg("--version").assert().code(0);
}

#[test]
fn test_exit_code_success_on_empty_catalog() {
    let fixture = TestFixture::new().with_config(configs::EMPTY);

    fixture
        .command()
        .arg("sync")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("No repositories selected"));
}

#[test]
fn test_exit_code_config_not_found() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration file not found"))
        .stderr(predicate::str::contains("repo-fleet init"));
}

#[test]
fn test_exit_code_invalid_toml() {
    let fixture = TestFixture::new().with_config(configs::INVALID_TOML);

    fixture
        .command()
        .arg("list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration parsing error"));
}

#[test]
fn test_exit_code_validation_error() {
    let fixture = TestFixture::new().with_config(configs::CONFLICTING_SELECTORS);

    fixture
        .command()
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_exit_code_unknown_project_and_tag() {
    let fixture = TestFixture::new().with_config(configs::TWO_REPOS);

    fixture
        .command()
        .args(["sync", "--project", "nope"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Project not found: nope"));

    fixture
        .command()
        .args(["sync", "--tag", "nope"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No repository is tagged 'nope'"));
}

#[test]
fn test_exit_code_usage_errors() {
    cargo_bin_cmd!("repo-fleet").arg("frobnicate").assert().code(2);

    let fixture = TestFixture::new().with_config(configs::TWO_REPOS);
    fixture
        .command()
        .args(["sync", "--project", "platform", "--tag", "backend"])
        .assert()
        .code(2);
}

#[test]
fn test_exit_code_mixed_selection_principles() {
    let fixture = TestFixture::new().with_config(configs::TWO_REPOS);

    fixture
        .command()
        .args(["sync", "api", "--project", "platform"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));

    fixture
        .command()
        .args(["sync", "web", "--tag", "backend"])
        .assert()
        .code(2);

    fixture
        .command()
        .args(["status", "api", "--project", "platform"])
        .assert()
        .code(2);

    // nothing was cloned
    fixture.child("repos").assert(predicate::path::missing());
}

#[test]
fn test_config_from_environment() {
    let fixture = TestFixture::new().with_file("custom/fleet.toml", configs::TWO_REPOS);

    fixture
        .command()
        .env("REPO_FLEET_CONFIG", fixture.path().join("custom/fleet.toml"))
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("api (git)"));
}
