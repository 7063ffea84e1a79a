//! Entry points used by the protocol shell and the CLI.
//!
//! The [`Orchestrator`] glues the pieces together: it captures new anchors
//! (file text + repository state → context patch → store) and answers
//! "which anchors are visible in this text right now" by running recovery
//! and the revision gate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::anchor::{Anchor, AnchorFile, LineRange};
use crate::error::AnchorError;
use crate::gate::{RepoContext, RevisionGate};
use crate::patch::Patches;
use crate::recovery::{DEFAULT_MIN_SIMILARITY, Recovered, RecoveryOptions, recover};
use crate::store::{AnchorStore, DEFAULT_STORE_DIR, StoreLayout};
use crate::vcs::{Vcs, bounded};

/// Tunables for capture, storage and recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorSettings {
    /// Lines of context captured above the selection
    pub context_before: usize,
    /// Lines of context captured below the selection
    pub context_after: usize,
    /// Threshold for accepting an approximate match
    pub min_similarity: f64,
    /// Upper bound for any single VCS query
    pub vcs_timeout: Duration,
    /// Anchor directory relative to the repository root
    pub store_dir: PathBuf,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        Self {
            context_before: 5,
            context_after: 5,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            vcs_timeout: Duration::from_millis(2000),
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
        }
    }
}

/// An anchor that is both locatable and visible, with its current range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleAnchor {
    pub anchor: Anchor,
    pub range: LineRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorStatus {
    /// Located and visible at HEAD
    Active(LineRange),
    /// Context could not be located in the text
    Stale,
    /// Located, but captured on a revision outside HEAD's history
    Hidden(LineRange),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorReport {
    pub anchor: Anchor,
    pub status: AnchorStatus,
}

pub struct Orchestrator {
    vcs: Arc<dyn Vcs>,
    store: AnchorStore,
    layout: StoreLayout,
    settings: AnchorSettings,
}

impl Orchestrator {
    pub fn new(vcs: Arc<dyn Vcs>, settings: AnchorSettings) -> Self {
        Self {
            vcs,
            store: AnchorStore::new(),
            layout: StoreLayout::new(settings.store_dir.clone()),
            settings,
        }
    }

    pub fn settings(&self) -> &AnchorSettings {
        &self.settings
    }

    pub fn store(&self) -> &AnchorStore {
        &self.store
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn vcs(&self) -> &Arc<dyn Vcs> {
        &self.vcs
    }

    /// Resolve the repository state for `path`.
    ///
    /// A HEAD that cannot be read (timeout, broken repository) is left as
    /// `None`, which makes every anchor visible.
    pub async fn repo_context(&self, path: &Path) -> RepoContext {
        let Some(root) = self.vcs.repo_root_for(path) else {
            return RepoContext::unversioned();
        };

        let query = self.vcs.current_head(&root);
        let head = match bounded(self.settings.vcs_timeout, "rev-parse HEAD", query).await {
            Ok(head) => Some(head),
            Err(e) => {
                warn!(repo = %root.display(), error = %e, "could not resolve HEAD");
                None
            }
        };

        RepoContext {
            root: Some(root),
            head,
        }
    }

    /// Where the anchors of `path` are persisted.
    pub fn anchor_file_path(&self, path: &Path, context: &RepoContext) -> PathBuf {
        self.layout.anchor_file_path(path, context.root.as_deref())
    }

    /// Capture a new anchor from the on-disk content of `path`.
    pub async fn create_anchor(
        &self,
        path: &Path,
        range: LineRange,
        message: &str,
    ) -> Result<Anchor, AnchorError> {
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || {
            std::fs::read_to_string(&owned).map_err(AnchorError::io(&owned))
        })
        .await??;

        self.create_anchor_in_text(path, &text, range, message)
            .await
    }

    /// Capture a new anchor from `text`, the current content of `path`
    /// (typically an unsaved editor buffer).
    ///
    /// Nothing is written unless every step succeeds.
    pub async fn create_anchor_in_text(
        &self,
        path: &Path,
        text: &str,
        range: LineRange,
        message: &str,
    ) -> Result<Anchor, AnchorError> {
        if message.trim().is_empty() {
            return Err(AnchorError::EmptyMessage);
        }
        if range.start > range.end {
            return Err(AnchorError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }

        // Unlike recovery, capture needs a real HEAD: an anchor stamped with
        // the wrong revision would be hidden or shown incorrectly forever.
        let root = self.vcs.repo_root_for(path);
        let base_revision = match &root {
            Some(root) => {
                let query = self.vcs.current_head(root);
                bounded(self.settings.vcs_timeout, "rev-parse HEAD", query).await?
            }
            None => String::new(),
        };

        let patch = Patches::window(
            text,
            range,
            self.settings.context_before,
            self.settings.context_after,
        );
        let anchor = Anchor::new(message.trim_end(), base_revision, patch.to_text());

        let file_path = self.layout.anchor_file_path(path, root.as_deref());
        self.store.append(&file_path, anchor.clone()).await?;

        info!(
            path = %path.display(),
            anchor = %anchor.id,
            range = %range,
            "created anchor"
        );
        Ok(anchor)
    }

    /// Anchors that can be located in `text` and are visible at the current
    /// HEAD, in creation order.
    pub async fn recover_visible(
        &self,
        path: &Path,
        text: &str,
        context: &RepoContext,
    ) -> Result<Vec<VisibleAnchor>, AnchorError> {
        let recovered = self.recover_in(path, text, context).await?;
        let gate = RevisionGate::new(Arc::clone(&self.vcs), self.settings.vcs_timeout);

        let mut visible = Vec::with_capacity(recovered.len());
        for Recovered { anchor, range, .. } in recovered {
            let Some(range) = range else {
                continue;
            };
            if gate.is_visible(&anchor, context).await {
                visible.push(VisibleAnchor { anchor, range });
            }
        }

        debug!(path = %path.display(), count = visible.len(), "recovered visible anchors");
        Ok(visible)
    }

    /// Every stored anchor of `path` with its status against `text`.
    pub async fn recover_all(
        &self,
        path: &Path,
        text: &str,
        context: &RepoContext,
    ) -> Result<Vec<AnchorReport>, AnchorError> {
        let recovered = self.recover_in(path, text, context).await?;
        let gate = RevisionGate::new(Arc::clone(&self.vcs), self.settings.vcs_timeout);

        let mut reports = Vec::with_capacity(recovered.len());
        for Recovered { anchor, range, .. } in recovered {
            let status = match range {
                None => AnchorStatus::Stale,
                Some(range) if gate.is_visible(&anchor, context).await => {
                    AnchorStatus::Active(range)
                }
                Some(range) => AnchorStatus::Hidden(range),
            };
            reports.push(AnchorReport { anchor, status });
        }
        Ok(reports)
    }

    /// Load the anchors of `path`. A file that fails to parse counts as
    /// empty; it is left on disk as-is.
    pub async fn load_anchors(
        &self,
        path: &Path,
        context: &RepoContext,
    ) -> Result<AnchorFile, AnchorError> {
        let file_path = self.anchor_file_path(path, context);
        match self.store.load(&file_path).await {
            Ok(file) => Ok(file.unwrap_or_default()),
            Err(AnchorError::Parse { path, source }) => {
                warn!(path = %path.display(), error = %source, "ignoring unreadable anchor file");
                Ok(AnchorFile::default())
            }
            Err(e) => Err(e),
        }
    }

    async fn recover_in(
        &self,
        path: &Path,
        text: &str,
        context: &RepoContext,
    ) -> Result<Vec<Recovered>, AnchorError> {
        let file = self.load_anchors(path, context).await?;
        if file.is_empty() {
            return Ok(Vec::new());
        }

        let text = text.to_owned();
        let options = RecoveryOptions {
            min_similarity: self.settings.min_similarity,
        };
        let recovered =
            tokio::task::spawn_blocking(move || recover(&file, &text, &options)).await?;
        Ok(recovered)
    }
}
