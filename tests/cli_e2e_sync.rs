//! End-to-end tests for `sync` and `status`.
//!
//! Repositories are plain HTTP downloads served from a loopback server, so
//! the whole clone / lock / locked-resync cycle runs without a network.

mod common;
use common::prelude::*;
use common::{http_config, sha256_hex};

fn lock(fixture: &TestFixture) -> toml::Value {
    toml::from_str(&fixture.read(".repo-fleet.lock")).unwrap()
}

#[test]
fn test_sync_downloads_and_writes_lock() {
    let server = TestServer::serving("schema v1");
    let fixture = TestFixture::new().with_config(&http_config(&[(
        "schema",
        &server.url("schema.json"),
    )]));

    fixture
        .command()
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] schema"))
        .stdout(predicate::str::contains("Synced 1/1 repositories"));

    assert_eq!(fixture.read("repos/schema"), "schema v1");

    let lock = lock(&fixture);
    assert_eq!(lock["version"].as_integer(), Some(1));
    let entry = &lock["entry"]["schema"];
    assert_eq!(entry["type"].as_str(), Some("http"));
    assert_eq!(
        entry["resolved_ref"].as_str(),
        Some(sha256_hex(b"schema v1").as_str())
    );
}

#[test]
fn test_partial_failure_exits_nonzero_and_locks_successes() {
    let good = TestServer::serving("ok");
    let bad = TestServer::start(vec![Reply::status(404)]);
    let fixture = TestFixture::new().with_config(&http_config(&[
        ("good", &good.url("good.txt")),
        ("bad", &bad.url("bad.txt")),
    ]));

    fixture
        .command()
        .arg("sync")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[OK] good"))
        .stdout(predicate::str::contains("[FAIL] bad"))
        .stderr(predicate::str::contains("1 of 2 repositories failed"));

    // retry_attempts = 1 in the fixture config
    assert_eq!(bad.hits(), 2);
    fixture.child("repos/bad").assert(predicate::path::missing());

    let lock = lock(&fixture);
    let entries = lock["entry"].as_table().unwrap();
    assert!(entries.contains_key("good"));
    assert!(!entries.contains_key("bad"));
}

#[test]
fn test_locked_sync_reproduces_and_detects_drift() {
    let server = TestServer::start(vec![Reply::ok("v1"), Reply::ok("v1"), Reply::ok("v2")]);
    let fixture = TestFixture::new().with_config(&http_config(&[(
        "artifact",
        &server.url("artifact.bin"),
    )]));

    fixture.command().arg("sync").assert().success();
    let recorded = fixture.read(".repo-fleet.lock");

    fixture
        .command()
        .args(["sync", "--locked"])
        .assert()
        .success();

    fixture
        .command()
        .args(["sync", "--locked"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Locked reference mismatch"));

    assert_eq!(fixture.read(".repo-fleet.lock"), recorded);
}

#[test]
fn test_locked_sync_without_lock_entry_fails() {
    let server = TestServer::serving("content");
    let fixture = TestFixture::new().with_config(&http_config(&[(
        "artifact",
        &server.url("artifact.bin"),
    )]));

    fixture
        .command()
        .args(["sync", "--locked"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("No lock entry for artifact"));

    assert_eq!(server.hits(), 0);
    fixture.child(".repo-fleet.lock").assert(predicate::path::missing());
}

#[test]
fn test_sync_selects_by_name() {
    let a = TestServer::serving("a");
    let b = TestServer::serving("b");
    let fixture = TestFixture::new().with_config(&http_config(&[
        ("a", &a.url("a.txt")),
        ("b", &b.url("b.txt")),
    ]));

    fixture.command().args(["sync", "b"]).assert().success();

    assert_eq!(a.hits(), 0);
    assert_eq!(b.hits(), 1);
    fixture.child("repos/a").assert(predicate::path::missing());
}

#[test]
fn test_sync_unknown_repository_is_an_error() {
    let fixture = TestFixture::new().with_config(configs::TWO_REPOS);

    fixture
        .command()
        .args(["sync", "ghost"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Repository not found: ghost"));
}

#[test]
fn test_sync_rejects_zero_parallelism() {
    let fixture = TestFixture::new().with_config(configs::TWO_REPOS);

    fixture
        .command()
        .args(["sync", "--parallel", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Concurrency limit must be at least 1"));
}

#[test]
fn test_dry_run_touches_nothing() {
    let server = TestServer::serving("content");
    let fixture = TestFixture::new().with_config(&http_config(&[(
        "artifact",
        &server.url("artifact.bin"),
    )]));

    fixture
        .command()
        .args(["sync", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[DRY] artifact clone"));

    assert_eq!(server.hits(), 0);
    fixture.child("repos").assert(predicate::path::missing());
}

#[test]
fn test_status_after_sync() {
    let server = TestServer::serving("content");
    let fixture = TestFixture::new().with_config(&http_config(&[
        ("artifact", &server.url("artifact.bin")),
        ("later", &server.url("later.bin")),
    ]));

    fixture.command().args(["sync", "artifact"]).assert().success();

    let digest = sha256_hex(b"content");
    fixture
        .command()
        .args(["status", "--porcelain"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "ok\tartifact\t{}\t{}\t",
            digest, digest
        )))
        .stdout(predicate::str::contains("missing\tlater\t-\t-\t"));

    let output = fixture
        .command()
        .args(["status", "--json", "artifact"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json[0]["name"], "artifact");
    assert_eq!(json[0]["type"], "http");
    assert_eq!(json[0]["exists"], true);
    assert_eq!(json[0]["needs_update"], false);
}

#[test]
fn test_work_dir_override() {
    let server = TestServer::serving("content");
    let fixture = TestFixture::new().with_config(&http_config(&[(
        "artifact",
        &server.url("artifact.bin"),
    )]));

    fixture
        .command()
        .args(["--work-dir", "elsewhere", "sync"])
        .assert()
        .success();

    fixture
        .child("elsewhere/artifact")
        .assert(predicate::path::exists());
    fixture.child("repos").assert(predicate::path::missing());
}
