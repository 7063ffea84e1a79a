//! Error types for anchor operations.

use std::path::PathBuf;

use crate::vcs::VcsError;

#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse anchor file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode anchor file: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error("annotation message must not be empty")]
    EmptyMessage,

    #[error("invalid line range: start {start} is after end {end}")]
    InvalidRange { start: usize, end: usize },

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AnchorError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| AnchorError::Io { path, source }
    }
}
