//! CLI integration tests for shardsift-dedup.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a Command for the shardsift-dedup binary.
#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin("shardsift-dedup").unwrap()
}

fn write_input(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    let a = serde_json::json!({"id": "a", "text": "The cat sat. It was warm. The sun set."});
    let b = serde_json::json!({
        "id": "b",
        "text": "The cat sat. It was warm. The sun set. Then it rained."
    });
    fs::write(dir.join("a.jsonl"), format!("{a}\n")).unwrap();
    fs::write(dir.join("b.jsonl"), format!("{b}\n")).unwrap();
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Distributed sentence-window deduplication over sharded document sets",
        ))
        .stdout(predicate::str::contains("find-dups"));
}

#[test]
fn test_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("shardsift-dedup"));
}

#[test]
fn test_completions() {
    cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shardsift-dedup"));
}

// ============================================================================
// Argument Validation Tests
// ============================================================================

#[test]
fn test_missing_work_dir() {
    let temp = TempDir::new().unwrap();
    cmd()
        .arg("signatures")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--work-dir"));
}

#[test]
fn test_invalid_shard_index() {
    let temp = TempDir::new().unwrap();
    cmd()
        .arg("signatures")
        .arg(temp.path())
        .args(["-W", temp.path().join("work").to_str().unwrap()])
        .args(["--shard-index", "2", "--shard-count", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn test_filter_without_duplicates_fails() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input");
    write_input(&input);

    cmd()
        .arg("filter")
        .arg(&input)
        .args(["-o", temp.path().join("out").to_str().unwrap()])
        .args(["-W", temp.path().join("work").to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate file not found"));
}

// ============================================================================
// Stage Tests
// ============================================================================

#[test]
fn test_stages_one_by_one() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input");
    let output = temp.path().join("output");
    let work = temp.path().join("work");
    write_input(&input);
    let work_arg = work.to_str().unwrap();

    for index in ["0", "1"] {
        cmd()
            .arg("signatures")
            .arg(&input)
            .args(["-W", work_arg, "--shard-index", index, "--shard-count", "2"])
            .assert()
            .success();
    }
    assert!(work.join("signatures").join("00000.sig").exists());
    assert!(work.join("signatures").join("00001.sig").exists());

    cmd()
        .args(["find-dups", "-W", work_arg, "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"duplicates\": 1"));

    cmd()
        .arg("filter")
        .arg(&input)
        .args(["-o", output.to_str().unwrap(), "-W", work_arg])
        .args(["--tasks", "2", "--min-doc-words", "0"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Documents written: 2"));

    let b = fs::read_to_string(output.join("00001.jsonl")).unwrap();
    assert!(b.contains("\"text\":\"Then it rained.\""));
}

#[test]
fn test_run_json_output() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input");
    let output = temp.path().join("output");
    write_input(&input);

    cmd()
        .arg("run")
        .arg(&input)
        .args(["-o", output.to_str().unwrap()])
        .args(["-W", temp.path().join("work").to_str().unwrap()])
        .args(["--tasks", "2", "--min-doc-words", "0", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"signatures\": 3"))
        .stdout(predicate::str::contains("\"duplicates\": 1"))
        .stdout(predicate::str::contains("\"documents_written\": 2"));
}

#[test]
fn test_run_zstd_with_window_start() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("input");
    let output = temp.path().join("output");
    write_input(&input);

    cmd()
        .arg("run")
        .arg(&input)
        .args(["-o", output.to_str().unwrap()])
        .args(["-W", temp.path().join("work").to_str().unwrap()])
        .args(["--tasks", "2", "--min-doc-words", "0"])
        .args(["--drop-policy", "window-start", "--compression", "zstd"])
        .assert()
        .success();

    let compressed = fs::read(output.join("00001.jsonl.zst")).unwrap();
    let text = String::from_utf8(zstd::decode_all(compressed.as_slice()).unwrap()).unwrap();
    assert!(text.contains("It was warm. The sun set. Then it rained."));
}
