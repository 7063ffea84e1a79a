//! Version control queries.
//!
//! The engine only needs four answers from the repository: where its root
//! is, what HEAD is, whether a commit is an ancestor of HEAD, and what a file
//! looked like at a commit. [`Vcs`] abstracts those so the git binary can be
//! swapped for a library binding or a fake in tests.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("`{command}` failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("unknown revision {0}")]
    UnknownRevision(String),

    #[error("`{command}` produced output that is not valid UTF-8")]
    Utf8 { command: String },
}

#[async_trait]
pub trait Vcs: Send + Sync {
    /// Root of the work tree containing `path`, or `None` outside a repository.
    fn repo_root_for(&self, path: &Path) -> Option<PathBuf>;

    /// Commit id currently checked out.
    async fn current_head(&self, repo_root: &Path) -> Result<String, VcsError>;

    /// Whether `commit` is `head` or one of its ancestors.
    ///
    /// Returns [`VcsError::UnknownRevision`] when the repository does not know
    /// `commit` at all.
    async fn is_ancestor(&self, repo_root: &Path, commit: &str, head: &str)
    -> Result<bool, VcsError>;

    /// Content of `rel_path` (relative to the root) at `commit`.
    async fn show_file_at(
        &self,
        repo_root: &Path,
        commit: &str,
        rel_path: &Path,
    ) -> Result<Vec<u8>, VcsError>;
}

/// Walk up from `path` looking for a `.git` directory or file.
pub fn find_repo_root(path: &Path) -> Option<PathBuf> {
    let mut current = if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()?.to_path_buf()
    };

    loop {
        if current.join(".git").exists() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Run a VCS query with an upper bound on its duration.
pub async fn bounded<T, F>(timeout: Duration, what: &str, query: F) -> Result<T, VcsError>
where
    F: Future<Output = Result<T, VcsError>>,
{
    match tokio::time::timeout(timeout, query).await {
        Ok(result) => result,
        Err(_) => Err(VcsError::Timeout {
            command: what.to_string(),
            after: timeout,
        }),
    }
}

/// [`Vcs`] backed by the `git` executable.
///
/// Child processes are killed when their future is dropped, so wrapping a
/// call in [`bounded`] does not leak a stuck `git`.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, repo_root: &Path, args: &[&str]) -> Result<(String, Output), VcsError> {
        let command = format!("git {}", args.join(" "));
        debug!(repo = %repo_root.display(), %command, "running git");

        let output = tokio::process::Command::new(&self.program)
            .args(args)
            .current_dir(repo_root)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| VcsError::Spawn {
                command: command.clone(),
                source,
            })?;

        Ok((command, output))
    }

    fn failed(command: String, output: &Output) -> VcsError {
        VcsError::Failed {
            command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

#[async_trait]
impl Vcs for GitCli {
    fn repo_root_for(&self, path: &Path) -> Option<PathBuf> {
        find_repo_root(path)
    }

    async fn current_head(&self, repo_root: &Path) -> Result<String, VcsError> {
        let (command, output) = self.run(repo_root, &["rev-parse", "HEAD"]).await?;
        if !output.status.success() {
            return Err(Self::failed(command, &output));
        }
        let head = String::from_utf8(output.stdout).map_err(|_| VcsError::Utf8 { command })?;
        Ok(head.trim().to_string())
    }

    async fn is_ancestor(
        &self,
        repo_root: &Path,
        commit: &str,
        head: &str,
    ) -> Result<bool, VcsError> {
        let object = format!("{commit}^{{commit}}");
        let (_, exists) = self.run(repo_root, &["cat-file", "-e", &object]).await?;
        if !exists.status.success() {
            return Err(VcsError::UnknownRevision(commit.to_string()));
        }

        let (command, output) = self
            .run(repo_root, &["merge-base", "--is-ancestor", commit, head])
            .await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(Self::failed(command, &output)),
        }
    }

    async fn show_file_at(
        &self,
        repo_root: &Path,
        commit: &str,
        rel_path: &Path,
    ) -> Result<Vec<u8>, VcsError> {
        // git wants forward slashes in tree paths on every platform
        let rel = rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let object = format!("{commit}:{rel}");
        let (command, output) = self.run(repo_root, &["show", &object]).await?;
        if !output.status.success() {
            return Err(Self::failed(command, &output));
        }
        Ok(output.stdout)
    }
}
