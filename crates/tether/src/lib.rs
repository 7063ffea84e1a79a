//! tether library - Line annotations that follow the code
//!
//! This library exposes the language server, configuration and CLI report
//! of tether for testing and embedding purposes. The anchoring engine itself
//! lives in `tether-core`.

pub mod config;
pub mod list;
pub mod lsp;

use std::path::PathBuf;

use eyre::{Result, WrapErr};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `TETHER_LOG=tether_core=debug`.
pub const LOG_ENV: &str = "TETHER_LOG";

/// Install the global tracing subscriber.
///
/// Logs go to stderr: in server mode stdout carries the LSP stream.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

/// Nearest ancestor of the current directory containing `.git`, or the
/// current directory itself.
pub fn find_project_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir().wrap_err("Failed to get current directory")?;
    Ok(tether_core::find_repo_root(&cwd).unwrap_or(cwd))
}
