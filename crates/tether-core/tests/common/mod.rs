//! Common test utilities.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tether_core::{AnchorSettings, Orchestrator, Vcs, VcsError};

/// In-memory repository: a root, a movable HEAD, and a set of commits that
/// are ancestors of HEAD. Commits not in `known` do not exist at all.
pub struct FakeVcs {
    pub root: PathBuf,
    pub head: Mutex<String>,
    pub ancestors: Mutex<HashSet<String>>,
    pub known: Mutex<HashSet<String>>,
    pub delay: Option<Duration>,
}

impl FakeVcs {
    pub fn new(root: &Path, head: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            head: Mutex::new(head.to_string()),
            ancestors: Mutex::new(HashSet::new()),
            known: Mutex::new([head.to_string()].into()),
            delay: None,
        }
    }

    /// Move HEAD to `commit`, keeping the previous HEAD as an ancestor.
    pub fn commit(&self, commit: &str) {
        let mut head = self.head.lock().unwrap();
        self.ancestors.lock().unwrap().insert(head.clone());
        self.known.lock().unwrap().insert(commit.to_string());
        *head = commit.to_string();
    }

    /// Move HEAD to `commit` on an unrelated line of history.
    pub fn checkout_orphan(&self, commit: &str) {
        self.ancestors.lock().unwrap().clear();
        self.known.lock().unwrap().insert(commit.to_string());
        *self.head.lock().unwrap() = commit.to_string();
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    fn repo_root_for(&self, path: &Path) -> Option<PathBuf> {
        path.starts_with(&self.root).then(|| self.root.clone())
    }

    async fn current_head(&self, _repo_root: &Path) -> Result<String, VcsError> {
        Ok(self.head.lock().unwrap().clone())
    }

    async fn is_ancestor(
        &self,
        _repo_root: &Path,
        commit: &str,
        head: &str,
    ) -> Result<bool, VcsError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.known.lock().unwrap().contains(commit) {
            return Err(VcsError::UnknownRevision(commit.to_string()));
        }
        Ok(commit == head || self.ancestors.lock().unwrap().contains(commit))
    }

    async fn show_file_at(
        &self,
        repo_root: &Path,
        _commit: &str,
        rel_path: &Path,
    ) -> Result<Vec<u8>, VcsError> {
        std::fs::read(repo_root.join(rel_path)).map_err(|e| VcsError::Failed {
            command: "show".to_string(),
            stderr: e.to_string(),
        })
    }
}

/// Orchestrator over `vcs` with default settings.
pub fn orchestrator(vcs: Arc<FakeVcs>) -> Orchestrator {
    Orchestrator::new(vcs, AnchorSettings::default())
}

/// `count` lines reading `line 1` .. `line N`, newline-terminated.
pub fn numbered_lines(count: usize) -> String {
    (1..=count).map(|i| format!("line {i}\n")).collect()
}

/// Insert `inserted` before the 0-based line `index`.
pub fn insert_lines(text: &str, index: usize, inserted: &[&str]) -> String {
    let mut lines: Vec<&str> = text.split('\n').collect();
    lines.splice(index..index, inserted.iter().copied());
    lines.join("\n")
}
