//! Integration tests that run the tether binary

use std::path::Path;
use std::process::{Command, Output};

use tether_core::{Anchor, AnchorFile, LineRange, Patches};

mod common;
use common::*;

fn tether_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tether"))
}

fn list(root: &Path, args: &[&str]) -> Output {
    tether_bin()
        .arg("--root")
        .arg(root)
        .arg("list")
        .args(args)
        .current_dir(root)
        .output()
        .expect("Failed to run tether")
}

/// Store one anchor on `range` of `text` for `rel`, the way the server would.
fn store_anchor(root: &Path, rel: &str, text: &str, range: LineRange, message: &str) {
    let patch = Patches::window(text, range, 5, 5).to_text();
    let mut file = AnchorFile::new();
    file.push(Anchor::new(message, "", patch));
    write_file(
        root,
        &format!("comments/{rel}.json"),
        &file.to_json().unwrap(),
    );
}

#[test]
fn test_help_lists_subcommands() {
    let output = tether_bin()
        .arg("--help")
        .output()
        .expect("Failed to run tether");

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("lsp"), "Should mention lsp: {stdout}");
    assert!(stdout.contains("list"), "Should mention list: {stdout}");
}

#[test]
fn test_list_reports_current_position() {
    let (_temp, root) = canonical_tempdir();
    git_init(&root);
    let text = numbered_lines(20);
    write_file(&root, "src/lib.rs", &text);
    git_commit_all(&root, "initial");
    store_anchor(&root, "src/lib.rs", &text, LineRange::new(10, 12), "fix this");

    let mut edited = String::from("a\nb\nc\n");
    edited.push_str(&text);
    write_file(&root, "src/lib.rs", &edited);

    let output = list(&root, &["src/lib.rs", "--format", "json"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "list failed: {stderr}");

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["path"], "src/lib.rs");
    assert_eq!(report["anchors"][0]["message"], "fix this");
    assert_eq!(report["anchors"][0]["status"], "active");
    assert_eq!(report["anchors"][0]["range"]["start"], 13);
    assert_eq!(report["anchors"][0]["range"]["end"], 15);
}

#[test]
fn test_list_at_revision_uses_committed_content() {
    let (_temp, root) = canonical_tempdir();
    git_init(&root);
    let text = numbered_lines(20);
    write_file(&root, "src/lib.rs", &text);
    let initial = git_commit_all(&root, "initial");
    store_anchor(&root, "src/lib.rs", &text, LineRange::new(10, 12), "fix this");

    // Working copy rewritten entirely: the anchor is stale there...
    write_file(&root, "src/lib.rs", "fn main() {}\n");
    let output = list(&root, &["src/lib.rs", "--format", "json"]);
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["anchors"][0]["status"], "stale");

    // ...but still where it was in the commit.
    let output = list(&root, &["src/lib.rs", "--at", &initial, "--format", "json"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "list --at failed: {stderr}");
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["anchors"][0]["status"], "active");
    assert_eq!(report["anchors"][0]["range"]["start"], 10);
}

#[test]
fn test_list_text_output() {
    let (_temp, root) = canonical_tempdir();
    let text = numbered_lines(10);
    write_file(&root, "notes.txt", &text);

    // Outside a repository anchors sit next to the file.
    let patch = Patches::window(&text, LineRange::new(1, 1), 5, 5).to_text();
    let mut file = AnchorFile::new();
    file.push(Anchor::new("loose note", "", patch));
    write_file(&root, "notes.txt.json", &file.to_json().unwrap());

    let output = list(&root, &["notes.txt"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("1 anchor"), "Should count anchors: {stdout}");
    assert!(stdout.contains("loose note"), "Should show message: {stdout}");
    assert!(stdout.contains("2-2"), "Should show 1-based range: {stdout}");
}

#[test]
fn test_list_rejects_unknown_format() {
    let (_temp, root) = canonical_tempdir();
    write_file(&root, "a.txt", "x\n");

    let output = list(&root, &["a.txt", "--format", "html"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown format"), "stderr: {stderr}");
}
