//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against an isolated data
//! directory and verify outputs.

use std::path::Path;
use std::process::Command;

fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "shelfmark-cli", "--"])
        .args(args)
        .env("SHELFMARK_DATA_DIR", data_dir)
        .env_remove("SHELFMARK_TOKEN")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

/// Isolated data dir with auto-sync disabled so no test touches the
/// network or the keyring.
fn data_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "[remote]\nauto_sync = false\n",
    )
    .unwrap();
    dir
}

fn add_book(dir: &Path, title: &str) -> String {
    let (stdout, stderr, code) = run_cli(dir, &["book", "add", title]);
    assert_eq!(code, 0, "book add failed: {stderr}");
    let book: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    book["id"].as_str().unwrap().to_string()
}

#[test]
fn book_add_and_list() {
    let dir = data_dir();
    let id = add_book(dir.path(), "The Left Hand of Darkness");

    let (stdout, _, code) = run_cli(dir.path(), &["book", "list"]);
    assert_eq!(code, 0);
    let books: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let books = books.as_array().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0]["id"], id.as_str());
    assert_eq!(books[0]["status"], "reading");
}

#[test]
fn timer_lifecycle_produces_pending_session() {
    let dir = data_dir();
    let id = add_book(dir.path(), "Piranesi");

    let (stdout, stderr, code) = run_cli(dir.path(), &["timer", "start", &id]);
    assert_eq!(code, 0, "timer start failed: {stderr}");
    let event: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(event["type"], "TimerStarted");

    // The timer state survives across processes.
    let (stdout, _, code) = run_cli(dir.path(), &["timer", "status"]);
    assert_eq!(code, 0);
    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["phase"], "running");
    assert_eq!(status["reading_id"], id.as_str());

    let (stdout, stderr, code) = run_cli(dir.path(), &["timer", "finish", "--progress", "0.25"]);
    assert_eq!(code, 0, "timer finish failed: {stderr}");
    let session: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(session["reading_id"], id.as_str());
    assert_eq!(session["sync_state"], "pending");
    assert_eq!(session["progress_fraction"], 0.25);

    let (stdout, _, code) = run_cli(dir.path(), &["sync", "status"]);
    assert_eq!(code, 0);
    let pending: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(pending["pending_sessions"], 1);
    assert_eq!(pending["pending_highlights"], 0);
}

#[test]
fn timer_finish_without_session_fails() {
    let dir = data_dir();
    let (_, stderr, code) = run_cli(dir.path(), &["timer", "finish"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("no session in progress"), "stderr: {stderr}");
}

#[test]
fn highlight_add_and_soft_remove() {
    let dir = data_dir();
    let id = add_book(dir.path(), "Annotated");

    let (stdout, stderr, code) =
        run_cli(dir.path(), &["highlight", "add", &id, "a line worth keeping"]);
    assert_eq!(code, 0, "highlight add failed: {stderr}");
    let highlight: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let hl_id = highlight["id"].as_str().unwrap().to_string();

    let (_, _, code) = run_cli(dir.path(), &["highlight", "remove", &hl_id]);
    assert_eq!(code, 0);

    // Soft-deleted: hidden from listing, still counted as pending work.
    let (stdout, _, code) = run_cli(dir.path(), &["highlight", "list", &id]);
    assert_eq!(code, 0);
    let listed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(listed.as_array().unwrap().is_empty());
}

#[test]
fn sync_run_requires_authentication() {
    let dir = data_dir();
    let (_, _, code) = run_cli(dir.path(), &["sync", "run"]);
    assert_ne!(code, 0);
}
