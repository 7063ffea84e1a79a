//! Revision gate: should an anchor captured at some commit still be shown?
//!
//! An anchor whose base revision is not in the history of the current HEAD
//! was captured on content the user no longer has (abandoned branch,
//! rebased-away commit) and is hidden. Anchors without a base revision are
//! always shown, and so is anything the repository cannot answer for in
//! time: a failed or slow query falls back to visible.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::anchor::Anchor;
use crate::vcs::{Vcs, VcsError, bounded};

/// What the repository looks like for one file, resolved once per pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoContext {
    /// Work tree root, `None` outside a repository
    pub root: Option<PathBuf>,
    /// Checked-out commit, `None` when it could not be determined
    pub head: Option<String>,
}

impl RepoContext {
    pub fn unversioned() -> Self {
        Self::default()
    }

    pub fn is_versioned(&self) -> bool {
        self.root.is_some()
    }
}

/// Answers visibility questions, memoizing per base revision.
///
/// Meant to live for a single recovery pass; HEAD may move between passes.
pub struct RevisionGate {
    vcs: Arc<dyn Vcs>,
    timeout: Duration,
    verdicts: Mutex<HashMap<String, bool>>,
}

impl RevisionGate {
    pub fn new(vcs: Arc<dyn Vcs>, timeout: Duration) -> Self {
        Self {
            vcs,
            timeout,
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    pub async fn is_visible(&self, anchor: &Anchor, context: &RepoContext) -> bool {
        if !anchor.has_base_revision() {
            return true;
        }
        let (Some(root), Some(head)) = (&context.root, &context.head) else {
            debug!(anchor = %anchor.id, "no repository state, showing anchor");
            return true;
        };
        if anchor.base_revision == *head {
            return true;
        }

        let revision = anchor.base_revision.as_str();
        if let Some(&known) = self
            .verdicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(revision)
        {
            return known;
        }

        let query = self.vcs.is_ancestor(root, revision, head);
        let verdict = match bounded(self.timeout, "is-ancestor", query).await {
            Ok(true) => true,
            Ok(false) => {
                debug!(anchor = %anchor.id, revision, "base revision not in HEAD history");
                false
            }
            Err(VcsError::UnknownRevision(_)) => {
                debug!(anchor = %anchor.id, revision, "base revision unknown to repository");
                false
            }
            Err(e) => {
                warn!(anchor = %anchor.id, error = %e, "ancestry check failed, showing anchor");
                // Don't remember: the next pass may get an answer.
                return true;
            }
        };

        self.verdicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(revision.to_string(), verdict);
        verdict
    }
}
