//! CLI integration tests for the admin and budget commands.
//!
//! Each test uses an isolated temp directory for the database and cache, so
//! tests can run in parallel. None of them reach the hosting API.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use std::path::Path;

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use commitsync::store::{SqliteStore, Store};
use predicates::prelude::*;
use serde_json::Value;

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    fn data_dir_str(&self) -> String {
        self.data_dir().to_string_lossy().to_string()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("commitsync").expect("failed to find binary");
        cmd.env("NO_COLOR", "1");
        cmd.env_remove("GITHUB_TOKEN");
        cmd
    }

    fn init(&self) -> assert_cmd::assert::Assert {
        self.cmd()
            .args(["admin", "init", "--data-dir", &self.data_dir_str()])
            .assert()
    }

    fn add_user(&self, id: &str, email: &str) -> assert_cmd::assert::Assert {
        self.cmd()
            .args([
                "admin",
                "user",
                "add",
                "--data-dir",
                &self.data_dir_str(),
                "--id",
                id,
                "--email",
                email,
            ])
            .assert()
    }

    fn add_project(&self, id: &str, owner: &str, repository: &str) -> assert_cmd::assert::Assert {
        self.cmd()
            .args([
                "admin",
                "project",
                "add",
                "--data-dir",
                &self.data_dir_str(),
                "--id",
                id,
                "--name",
                "Demo",
                "--owner",
                owner,
                "--repository",
                repository,
            ])
            .assert()
    }

    fn info_json(&self) -> Value {
        let output = self
            .cmd()
            .args([
                "admin",
                "info",
                "--data-dir",
                &self.data_dir_str(),
                "--json",
            ])
            .output()
            .expect("failed to run command");

        serde_json::from_slice(&output.stdout).expect("failed to parse JSON")
    }

    fn store(&self) -> SqliteStore {
        SqliteStore::new(self.data_dir().join("commitsync.db")).expect("failed to open store")
    }
}

#[test]
fn test_init_creates_data_dir() {
    let ctx = TestContext::new();

    ctx.init()
        .success()
        .stdout(predicate::str::contains("Initialized"));

    ctx.temp_dir.child("commitsync.db").assert(predicate::path::exists());
    ctx.temp_dir
        .child("commitsync.toml")
        .assert(predicate::str::contains("stop_at_percent = 85"));
}

#[test]
fn test_init_twice_fails() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.init()
        .failure()
        .stderr(predicate::str::contains("Already initialized"));
}

#[test]
fn test_commands_require_init() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args(["admin", "info", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("commitsync admin init"));
}

#[test]
fn test_add_user_and_project() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.add_user("owner", "owner@example.com")
        .success()
        .stdout(predicate::str::contains("Created user owner"));
    ctx.add_project("p1", "owner", "octo/demo")
        .success()
        .stdout(predicate::str::contains("Created project p1"));

    let project = ctx.store().get_project("p1").unwrap().unwrap();
    assert_eq!(project.owner_id, "owner");
    assert_eq!(project.repository.as_deref(), Some("octo/demo"));

    let info = ctx.info_json();
    let projects = info.as_array().unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0]["id"], "p1");
    assert_eq!(projects[0]["repository"], "octo/demo");
    assert_eq!(projects[0]["commits"], 0);
    assert_eq!(projects[0]["unenriched"], 0);
}

#[test]
fn test_duplicate_user_fails() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.add_user("owner", "owner@example.com").success();

    ctx.add_user("owner", "other@example.com")
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_user_needs_an_identity() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.cmd()
        .args([
            "admin",
            "user",
            "add",
            "--data-dir",
            &ctx.data_dir_str(),
            "--id",
            "ghost",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--email or --login"));
}

#[test]
fn test_project_validation() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.add_project("p1", "nobody", "octo/demo")
        .failure()
        .stderr(predicate::str::contains("Owner 'nobody' not found"));

    ctx.add_user("owner", "owner@example.com").success();
    ctx.add_project("p1", "owner", "not-a-repo")
        .failure()
        .stderr(predicate::str::contains("expected owner/name"));
}

#[test]
fn test_quota_works_offline() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.add_user("owner", "owner@example.com").success();
    ctx.add_project("p1", "owner", "octo/demo").success();

    let output = ctx
        .cmd()
        .args([
            "quota",
            "--data-dir",
            &ctx.data_dir_str(),
            "--project",
            "p1",
            "--json",
        ])
        .output()
        .expect("failed to run command");
    assert!(output.status.success());

    let status: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["project_id"], "p1");
    assert_eq!(status["limit"], 60);
    assert_eq!(status["remaining"], 60);
    assert_eq!(status["quota"]["can_poll"], true);

    ctx.cmd()
        .args(["quota", "--data-dir", &ctx.data_dir_str(), "--project", "p1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fair share:"))
        .stdout(predicate::str::contains("no recent reading"));
}

#[test]
fn test_quota_uses_token_budget() {
    let ctx = TestContext::new();
    ctx.init().success();

    let output = ctx
        .cmd()
        .env("GITHUB_TOKEN", "ghp_example")
        .args([
            "quota",
            "--data-dir",
            &ctx.data_dir_str(),
            "--project",
            "p1",
            "--json",
        ])
        .output()
        .expect("failed to run command");

    let status: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["limit"], 5000);
    assert_eq!(status["threshold_remaining"], 750);
}

#[test]
fn test_sync_unknown_project_fails() {
    let ctx = TestContext::new();
    ctx.init().success();

    ctx.cmd()
        .args(["sync", "--data-dir", &ctx.data_dir_str(), "--project", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("project missing"));
}

#[test]
fn test_sync_without_repository_fails() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.add_user("owner", "owner@example.com").success();
    ctx.cmd()
        .args([
            "admin",
            "project",
            "add",
            "--data-dir",
            &ctx.data_dir_str(),
            "--id",
            "bare",
            "--name",
            "Bare",
            "--owner",
            "owner",
        ])
        .assert()
        .success();

    ctx.cmd()
        .args(["sync", "--data-dir", &ctx.data_dir_str(), "--project", "bare"])
        .assert()
        .failure();
}
