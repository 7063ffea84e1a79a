//! Configuration schema for tether
//!
//! Config lives at `.config/tether/config.yaml` relative to the project root.
//! Every key is optional:
//!
//! ```yaml
//! context_before: 5
//! context_after: 5
//! store_dir: comments
//! vcs_timeout_ms: 2000
//! min_similarity: 0.6
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Result, WrapErr};
use facet::Facet;
use tether_core::AnchorSettings;
use tracing::warn;

/// Root configuration for tether
#[derive(Debug, Clone, Default, PartialEq, Facet)]
pub struct Config {
    /// Lines of context captured above a selection
    #[facet(default)]
    pub context_before: Option<usize>,

    /// Lines of context captured below a selection
    #[facet(default)]
    pub context_after: Option<usize>,

    /// Anchor directory, relative to the repository root
    #[facet(default)]
    pub store_dir: Option<String>,

    /// Upper bound for a single git query, in milliseconds
    #[facet(default)]
    pub vcs_timeout_ms: Option<u64>,

    /// Line similarity (0.0 to 1.0) needed to accept a moved, edited context
    #[facet(default)]
    pub min_similarity: Option<f64>,
}

impl Config {
    /// Engine settings, with defaults filled in for missing keys.
    pub fn settings(&self) -> AnchorSettings {
        let defaults = AnchorSettings::default();
        AnchorSettings {
            context_before: self.context_before.unwrap_or(defaults.context_before),
            context_after: self.context_after.unwrap_or(defaults.context_after),
            min_similarity: self
                .min_similarity
                .map(|s| s.clamp(0.0, 1.0))
                .unwrap_or(defaults.min_similarity),
            vcs_timeout: self
                .vcs_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.vcs_timeout),
            store_dir: self
                .store_dir
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or(defaults.store_dir),
        }
    }
}

/// `.config/tether/config.yaml` under `root`.
pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(".config").join("tether").join("config.yaml")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = facet_yaml::from_str(&content)
        .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Load config if it exists, otherwise return the default config.
/// A config file that cannot be read or parsed is reported and ignored.
pub fn load_config_or_default(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %format!("{e:#}"), "using default config");
            Config::default()
        }
    }
}
