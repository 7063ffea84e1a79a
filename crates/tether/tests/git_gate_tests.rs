//! Revision gating against real git repositories.
//!
//! Each test creates a throwaway repository in a temp directory and drives
//! the orchestrator with the `git` CLI backend.

use std::path::Path;
use std::sync::Arc;

use tether_core::{
    Anchor, AnchorFile, AnchorSettings, AnchorStatus, GitCli, LineRange, Orchestrator, Patches,
    Vcs, VcsError,
};

mod common;
use common::*;

fn orchestrator() -> Orchestrator {
    Orchestrator::new(Arc::new(GitCli::default()), AnchorSettings::default())
}

fn insert_before(text: &str, index: usize, inserted: &[&str]) -> String {
    let mut lines: Vec<&str> = text.split('\n').collect();
    lines.splice(index..index, inserted.iter().copied());
    lines.join("\n")
}

// ============================================================================
// GitCli queries
// ============================================================================

#[tokio::test]
async fn test_git_cli_answers_queries() {
    let (_temp, root) = canonical_tempdir();
    git_init(&root);
    write_file(&root, "src/lib.rs", "one\n");
    let first = git_commit_all(&root, "first");
    write_file(&root, "src/lib.rs", "one\ntwo\n");
    let second = git_commit_all(&root, "second");

    let git = GitCli::default();
    assert_eq!(git.repo_root_for(&root.join("src/lib.rs")), Some(root.clone()));
    assert_eq!(git.current_head(&root).await.unwrap(), second);

    assert!(git.is_ancestor(&root, &first, &second).await.unwrap());
    assert!(git.is_ancestor(&root, &second, &second).await.unwrap());
    assert!(!git.is_ancestor(&root, &second, &first).await.unwrap());

    let missing = git
        .is_ancestor(&root, "0123456789abcdef0123456789abcdef01234567", &second)
        .await;
    assert!(matches!(missing, Err(VcsError::UnknownRevision(_))));

    let old = git
        .show_file_at(&root, &first, Path::new("src/lib.rs"))
        .await
        .unwrap();
    assert_eq!(old, b"one\n");
}

// ============================================================================
// Gating through the orchestrator
// ============================================================================

#[tokio::test]
async fn test_anchor_follows_edits_across_commits() {
    let (_temp, root) = canonical_tempdir();
    git_init(&root);
    let text = numbered_lines(20);
    let path = write_file(&root, "src/lib.rs", &text);
    let first = git_commit_all(&root, "initial");

    let orchestrator = orchestrator();
    let anchor = orchestrator
        .create_anchor(&path, LineRange::new(10, 12), "fix this")
        .await
        .unwrap();
    assert_eq!(anchor.base_revision, first);
    assert!(root.join("comments/src/lib.rs.json").exists());

    let edited = insert_before(&text, 4, &["a", "b", "c"]);
    std::fs::write(&path, &edited).unwrap();
    git_commit_all(&root, "insert lines");

    let context = orchestrator.repo_context(&path).await;
    let visible = orchestrator
        .recover_visible(&path, &edited, &context)
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].range, LineRange::new(13, 15));
}

#[tokio::test]
async fn test_anchor_on_abandoned_branch_is_hidden() {
    let (_temp, root) = canonical_tempdir();
    git_init(&root);
    let text = numbered_lines(20);
    let path = write_file(&root, "src/lib.rs", &text);
    git_commit_all(&root, "initial");

    git_checkout(&root, &["-b", "feature"]);
    write_file(&root, "README.md", "feature work\n");
    let feature = git_commit_all(&root, "feature");

    let orchestrator = orchestrator();
    let anchor = orchestrator
        .create_anchor(&path, LineRange::new(5, 6), "only on feature")
        .await
        .unwrap();
    assert_eq!(anchor.base_revision, feature);

    git_checkout(&root, &["main"]);

    // src/lib.rs is identical on main, so the patch still applies.
    let context = orchestrator.repo_context(&path).await;
    let visible = orchestrator
        .recover_visible(&path, &text, &context)
        .await
        .unwrap();
    assert!(visible.is_empty());

    let reports = orchestrator
        .recover_all(&path, &text, &context)
        .await
        .unwrap();
    assert_eq!(reports[0].status, AnchorStatus::Hidden(LineRange::new(5, 6)));

    // Merging the branch brings the anchor back.
    let status = std::process::Command::new("git")
        .args(["merge", "--ff-only", "feature"])
        .current_dir(&root)
        .status()
        .expect("git not found");
    assert!(status.success());

    let context = orchestrator.repo_context(&path).await;
    let visible = orchestrator
        .recover_visible(&path, &text, &context)
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
}

#[tokio::test]
async fn test_unknown_base_revision_is_hidden() {
    let (_temp, root) = canonical_tempdir();
    git_init(&root);
    let text = numbered_lines(20);
    let path = write_file(&root, "a.txt", &text);
    git_commit_all(&root, "initial");

    let orchestrator = orchestrator();
    let context = orchestrator.repo_context(&path).await;
    let patch = Patches::window(&text, LineRange::new(3, 3), 5, 5).to_text();

    let mut file = AnchorFile::new();
    file.push(Anchor::new(
        "from a rewritten history",
        "0123456789abcdef0123456789abcdef01234567",
        patch.clone(),
    ));
    file.push(Anchor::new("captured without git", "", patch));
    let file_path = orchestrator.anchor_file_path(&path, &context);
    orchestrator.store().save(&file_path, file).await.unwrap();

    let visible = orchestrator
        .recover_visible(&path, &text, &context)
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].anchor.message, "captured without git");
}

#[tokio::test]
async fn test_uncommitted_repository_cannot_capture() {
    // No commits yet: HEAD does not resolve, so there is no revision to stamp.
    let (_temp, root) = canonical_tempdir();
    git_init(&root);
    let path = write_file(&root, "a.txt", &numbered_lines(5));

    let result = orchestrator()
        .create_anchor(&path, LineRange::new(1, 1), "too early")
        .await;
    assert!(result.is_err());
    assert!(!root.join("comments").exists());
}
