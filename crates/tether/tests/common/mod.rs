//! Common test utilities.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git not found");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// Create and configure a throwaway git repository.
pub fn git_init(dir: &Path) {
    git(dir, &["init", "--initial-branch=main"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

/// Stage and commit everything in the repo, returning the new HEAD.
pub fn git_commit_all(dir: &Path, message: &str) -> String {
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", message]);
    git_head(dir)
}

pub fn git_head(dir: &Path) -> String {
    git(dir, &["rev-parse", "HEAD"])
}

pub fn git_checkout(dir: &Path, args: &[&str]) {
    let mut full = vec!["checkout"];
    full.extend_from_slice(args);
    git(dir, &full);
}

/// Write `content` to `rel` under `dir`, creating parents.
pub fn write_file(dir: &Path, rel: &str, content: &str) -> PathBuf {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

/// `count` lines reading `line 1` .. `line N`, newline-terminated.
pub fn numbered_lines(count: usize) -> String {
    (1..=count).map(|i| format!("line {i}\n")).collect()
}

/// Temp directory with symlinks resolved, so paths match what git reports.
pub fn canonical_tempdir() -> (tempfile::TempDir, PathBuf) {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let path = std::fs::canonicalize(temp.path()).unwrap();
    (temp, path)
}
