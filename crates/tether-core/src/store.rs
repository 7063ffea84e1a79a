//! Durable per-file anchor storage.
//!
//! Every tracked source file maps to one JSON anchor file. Inside a git work
//! tree it lives under `<root>/<store_dir>/<relative path>.json`; outside one
//! it sits next to the source as `<file>.json`.
//!
//! Reads and writes for one anchor file are serialized through a per-path
//! `RwLock`: recovery passes share it, appends take it exclusively. Writes go
//! to a temporary file in the destination directory and are renamed into
//! place, so a reader never observes a half-written file.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::anchor::{Anchor, AnchorFile};
use crate::error::AnchorError;

/// Default directory (relative to the repository root) for anchor files.
pub const DEFAULT_STORE_DIR: &str = "comments";

/// Maps source files to their anchor files.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    store_dir: PathBuf,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_DIR)
    }
}

impl StoreLayout {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
        }
    }

    /// The source file's logical identity: repository-relative inside a
    /// work tree, the path itself otherwise.
    pub fn logical_path(&self, source: &Path, repo_root: Option<&Path>) -> PathBuf {
        match repo_root.and_then(|root| source.strip_prefix(root).ok()) {
            Some(rel) => rel.to_path_buf(),
            None => source.to_path_buf(),
        }
    }

    /// Where the anchors of `source` are persisted.
    pub fn anchor_file_path(&self, source: &Path, repo_root: Option<&Path>) -> PathBuf {
        match repo_root {
            Some(root) if source.starts_with(root) => {
                let rel = self.logical_path(source, Some(root));
                with_json_suffix(root.join(&self.store_dir).join(rel))
            }
            _ => with_json_suffix(source.to_path_buf()),
        }
    }
}

fn with_json_suffix(path: PathBuf) -> PathBuf {
    let mut name: OsString = path.into_os_string();
    name.push(".json");
    PathBuf::from(name)
}

/// One lock per anchor file, created on first use.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>,
}

impl PathLocks {
    pub fn lock_for(&self, path: &Path) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }
}

/// Read an anchor file. `Ok(None)` means there is nothing stored yet.
pub fn read_anchor_file(path: &Path) -> Result<Option<AnchorFile>, AnchorError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AnchorError::io(path)(e)),
    };

    AnchorFile::from_json(&content)
        .map(Some)
        .map_err(|source| AnchorError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Write an anchor file atomically: temp file in the same directory, then rename.
pub fn write_anchor_file(path: &Path, file: &AnchorFile) -> Result<(), AnchorError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(AnchorError::io(dir))?;

    let mut json = file.to_json().map_err(AnchorError::Encode)?;
    json.push('\n');

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(AnchorError::io(dir))?;
    temp.write_all(json.as_bytes())
        .map_err(AnchorError::io(temp.path()))?;
    temp.as_file()
        .sync_all()
        .map_err(AnchorError::io(temp.path()))?;
    temp.persist(path).map_err(|e| AnchorError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(())
}

/// Anchor persistence with per-path mutual exclusion.
///
/// Filesystem work runs on the blocking pool.
#[derive(Debug, Default)]
pub struct AnchorStore {
    locks: PathLocks,
}

impl AnchorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the anchors stored at `path`.
    pub async fn load(&self, path: &Path) -> Result<Option<AnchorFile>, AnchorError> {
        let lock = self.locks.lock_for(path);
        let _guard = lock.read().await;

        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_anchor_file(&owned)).await?
    }

    /// Replace the anchors stored at `path`.
    pub async fn save(&self, path: &Path, file: AnchorFile) -> Result<(), AnchorError> {
        let lock = self.locks.lock_for(path);
        let _guard = lock.write().await;

        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_anchor_file(&owned, &file)).await??;
        debug!(path = %path.display(), "saved anchor file");
        Ok(())
    }

    /// Read-modify-write append. Concurrent appends to the same path are
    /// serialized so none is lost.
    ///
    /// An existing file that fails to parse is left untouched and the append
    /// is refused.
    pub async fn append(&self, path: &Path, anchor: Anchor) -> Result<usize, AnchorError> {
        let lock = self.locks.lock_for(path);
        let _guard = lock.write().await;

        let owned = path.to_path_buf();
        let count = tokio::task::spawn_blocking(move || {
            let mut file = read_anchor_file(&owned)?.unwrap_or_default();
            file.push(anchor);
            write_anchor_file(&owned, &file)?;
            Ok::<_, AnchorError>(file.len())
        })
        .await??;

        info!(path = %path.display(), count, "appended anchor");
        Ok(count)
    }
}
