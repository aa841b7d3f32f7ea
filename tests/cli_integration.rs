use std::path::Path;

use assert_cmd::Command;
use git2::Repository;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::{TempDir, tempdir};

fn init_repo() -> TempDir {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Repo User").unwrap();
    config.set_str("user.email", "repo@example.com").unwrap();
    dir
}

fn git_ctx(repo_root: &Path, author: &str) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("git-ctx"));
    cmd.current_dir(repo_root);
    cmd.env("GIT_CTX_AUTHOR", author);
    cmd.env_remove("RUST_LOG");
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn why_jwt_memory_scenario() {
    let dir = init_repo();
    let created = json_stdout(
        git_ctx(dir.path(), "alice")
            .args(["add", "Why JWT", "-m", "Because stateless", "--tag", "auth"])
            .arg("--json"),
    );
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 16);
    assert_eq!(created["shared"], false);
    assert_eq!(created["author"], "alice");

    git_ctx(dir.path(), "alice")
        .args(["show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Why JWT"))
        .stdout(predicate::str::contains("Because stateless"));

    let local = json_stdout(git_ctx(dir.path(), "alice").args(["list", "--format", "json"]));
    assert_eq!(local.as_array().unwrap().len(), 1);
    assert_eq!(local[0]["id"], id.as_str());

    let shared = json_stdout(git_ctx(dir.path(), "alice").args(["list", "--shared", "--json"]));
    assert!(shared.as_array().unwrap().is_empty());

    // Search covers both backends by default.
    git_ctx(dir.path(), "bob")
        .args(["search", "STATELESS"])
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()));
    git_ctx(dir.path(), "bob")
        .args(["search", "redis"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No results for: redis"));

    let shared_note = json_stdout(git_ctx(dir.path(), "bob").args([
        "add", "-s", "-t", "Stateless sessions", "-m", "x", "--json",
    ]));
    let local_hits = json_stdout(
        git_ctx(dir.path(), "bob").args(["search", "stateless", "--local", "--json"]),
    );
    let local_hits = local_hits.as_array().unwrap();
    assert_eq!(local_hits.len(), 1);
    assert_eq!(local_hits[0]["id"], id.as_str());
    let shared_hits =
        json_stdout(git_ctx(dir.path(), "bob").args(["search", "stateless", "-s", "--json"]));
    assert_eq!(shared_hits.as_array().unwrap().len(), 1);
    assert_eq!(shared_hits[0]["id"], shared_note["id"]);
}

#[test]
fn edit_and_remove_memory_by_prefix() {
    let dir = init_repo();
    let created = json_stdout(
        git_ctx(dir.path(), "alice").args(["add", "-s", "-t", "Draft", "-m", "v1", "--json"]),
    );
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["shared"], true);

    let edited = json_stdout(
        git_ctx(dir.path(), "alice").args(["edit", &id[..8], "-m", "v2", "--title", "Final", "--json"]),
    );
    assert_eq!(edited["content"], "v2");
    assert_eq!(edited["title"], "Final");
    assert_eq!(edited["shared"], true);

    git_ctx(dir.path(), "alice")
        .args(["rm", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted"));
    git_ctx(dir.path(), "alice")
        .args(["show", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains(format!("error: not found: {id}")));
}

#[test]
fn implement_auth_task_scenario() {
    let dir = init_repo();
    let task = json_stdout(
        git_ctx(dir.path(), "carol").args(["task", "add", "Implement", "auth", "--shared", "--json"]),
    );
    let id = task["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("task-"));
    assert_eq!(task["status"], "open");

    git_ctx(dir.path(), "alice")
        .args(["task", "claim", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Claimed"));
    git_ctx(dir.path(), "bob")
        .args(["task", "claim", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already claimed by alice"));
    git_ctx(dir.path(), "bob")
        .args(["task", "drop", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not owned by you"));

    let dropped = json_stdout(git_ctx(dir.path(), "alice").args(["task", "drop", &id, "--json"]));
    assert_eq!(dropped["status"], "open");
    assert_eq!(dropped["owner"].as_str().unwrap_or_default(), "");

    git_ctx(dir.path(), "bob")
        .args(["task", "comment", &id, "looks", "good"])
        .assert()
        .success();
    let done = json_stdout(git_ctx(dir.path(), "bob").args(["task", "done", &id, "--json"]));
    assert_eq!(done["status"], "done");
    assert!(done["doneAt"].is_string());
    assert_eq!(done["comments"][0]["content"], "looks good");
}

#[test]
fn task_list_reports_blocked_flag() {
    let dir = init_repo();
    let schema = json_stdout(git_ctx(dir.path(), "a").args(["task", "add", "Schema", "--json"]));
    let api = json_stdout(git_ctx(dir.path(), "a").args(["task", "add", "API", "--json"]));
    let schema_id = schema["id"].as_str().unwrap();
    let api_id = api["id"].as_str().unwrap();

    git_ctx(dir.path(), "a")
        .args(["task", "block", api_id, schema_id])
        .assert()
        .success();

    let listed = json_stdout(git_ctx(dir.path(), "a").args(["task", "list", "--json"]));
    let entry = |id: &str| {
        listed
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["id"] == id)
            .cloned()
            .unwrap()
    };
    assert_eq!(entry(api_id)["blocked"], true);
    assert_eq!(entry(api_id)["blockedBy"][0], schema_id);
    assert_eq!(entry(schema_id)["blocked"], false);

    git_ctx(dir.path(), "a")
        .args(["task", "block", api_id, api_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot depend on itself"));
}

#[test]
fn lock_conflicts_and_release() {
    let dir = init_repo();
    git_ctx(dir.path(), "alice")
        .args(["lock", "src/auth/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Locked (local): src/auth/"));
    git_ctx(dir.path(), "bob")
        .args(["lock", "--shared", "src/auth/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already locked by alice"));
    git_ctx(dir.path(), "bob")
        .args(["unlock", "src/auth/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot unlock: owned by alice"));

    let locks = json_stdout(git_ctx(dir.path(), "bob").args(["locks", "--all", "--json"]));
    assert_eq!(locks[0]["target"], "src/auth/");
    assert_eq!(locks[0]["lockedBy"], "alice");

    git_ctx(dir.path(), "alice")
        .args(["lock", "-s", "task-0000000000000001"])
        .assert()
        .success();
    git_ctx(dir.path(), "alice")
        .arg("unlock")
        .assert()
        .success()
        .stdout(predicate::str::contains("Released 2 lock(s)"));
    git_ctx(dir.path(), "alice")
        .args(["lock-list", "-a"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No active locks"));
}

#[test]
fn json_errors_carry_a_stable_code() {
    let dir = init_repo();
    let output = git_ctx(dir.path(), "alice")
        .args(["task", "show", "task-ffffffffffffffff", "--json"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let error: Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(error["error"], "task_not_found");
    assert!(error["message"].as_str().unwrap().contains("task-ffffffffffffffff"));
}

#[test]
fn outside_a_repository_fails_cleanly() {
    let dir = tempdir().unwrap();
    git_ctx(dir.path(), "alice")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a git repository"));
}

#[test]
fn unreadable_task_can_still_be_removed() {
    let dir = init_repo();
    let created = json_stdout(git_ctx(dir.path(), "alice").args(["task", "add", "Broken", "--json"]));
    let id = created["id"].as_str().unwrap().to_string();
    let path = dir
        .path()
        .join(".git/context/tasks")
        .join(format!("{id}.json"));
    std::fs::write(&path, "{oops").unwrap();

    git_ctx(dir.path(), "alice")
        .args(["task", "rm", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted unreadable record"))
        .stdout(predicate::str::contains(id.as_str()));
    assert!(!path.exists());
}
