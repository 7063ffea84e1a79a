//! `tether list`: report every anchor of a file and where it currently is.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Result, WrapErr};
use owo_colors::OwoColorize;
use tether_core::{
    AnchorReport, AnchorStatus, GitCli, Orchestrator, RepoContext, bounded,
};

use crate::config::{default_config_path, load_config_or_default};

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Recover the anchors of `file` and print them.
///
/// With `at`, the file content and the visibility check are taken at that
/// revision instead of the working copy and HEAD.
pub async fn run(
    root: Option<PathBuf>,
    config_path: Option<PathBuf>,
    file: PathBuf,
    at: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let project_root = match root {
        Some(r) => r,
        None => crate::find_project_root()?,
    };
    let config_path = config_path.unwrap_or_else(|| default_config_path(&project_root));
    let settings = load_config_or_default(&config_path).settings();
    let timeout = settings.vcs_timeout;

    let file = if file.is_absolute() {
        file
    } else {
        project_root.join(file)
    };
    let path = std::fs::canonicalize(&file)
        .wrap_err_with(|| format!("Failed to resolve {}", file.display()))?;

    let orchestrator = Orchestrator::new(Arc::new(GitCli::default()), settings);
    let mut context = orchestrator.repo_context(&path).await;

    let text = match &at {
        Some(revision) => {
            let Some(repo_root) = context.root.clone() else {
                eyre::bail!("--at needs {} to be inside a git repository", path.display());
            };
            let rel = path.strip_prefix(&repo_root).unwrap_or(&path);
            let query = orchestrator.vcs().show_file_at(&repo_root, revision, rel);
            let bytes = bounded(timeout, "show", query)
                .await
                .wrap_err_with(|| format!("Failed to read {} at {revision}", rel.display()))?;
            context = RepoContext {
                root: Some(repo_root),
                head: Some(revision.clone()),
            };
            String::from_utf8_lossy(&bytes).into_owned()
        }
        None => std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("Failed to read {}", path.display()))?,
    };

    let reports = orchestrator
        .recover_all(&path, &text, &context)
        .await
        .wrap_err_with(|| format!("Failed to recover anchors of {}", path.display()))?;

    let display = path.strip_prefix(&project_root).unwrap_or(&path);
    let output = match format {
        OutputFormat::Text => render_text(display, &reports),
        OutputFormat::Json => render_json(display, &reports)?,
    };
    print!("{output}");

    Ok(())
}

fn short_revision(revision: &str) -> &str {
    revision.get(..7).unwrap_or(revision)
}

pub fn render_text(path: &Path, reports: &[AnchorReport]) -> String {
    let mut output = String::new();
    let noun = if reports.len() == 1 { "anchor" } else { "anchors" };
    output.push_str(&format!(
        "{} {} {}\n",
        path.display().bold(),
        reports.len(),
        noun
    ));

    for report in reports {
        let (range, status) = match report.status {
            AnchorStatus::Active(range) => (range.to_string(), "active".green().to_string()),
            AnchorStatus::Hidden(range) => (range.to_string(), "hidden".dimmed().to_string()),
            AnchorStatus::Stale => ("-".to_string(), "stale ".yellow().to_string()),
        };
        let revision = if report.anchor.has_base_revision() {
            format!(" ({})", short_revision(&report.anchor.base_revision))
        } else {
            String::new()
        };
        output.push_str(&format!(
            "  {range:>9}  {status}  {}{}\n",
            report.anchor.message,
            revision.dimmed()
        ));
    }

    output
}

pub fn render_json(path: &Path, reports: &[AnchorReport]) -> Result<String> {
    let anchors: Vec<serde_json::Value> = reports
        .iter()
        .map(|report| {
            let (status, range) = match report.status {
                AnchorStatus::Active(range) => ("active", Some(range)),
                AnchorStatus::Hidden(range) => ("hidden", Some(range)),
                AnchorStatus::Stale => ("stale", None),
            };
            serde_json::json!({
                "id": report.anchor.id,
                "message": report.anchor.message,
                "baseRevision": report.anchor.base_revision,
                "status": status,
                "range": range,
            })
        })
        .collect();

    let mut json = serde_json::to_string_pretty(&serde_json::json!({
        "path": path.display().to_string(),
        "anchors": anchors,
    }))?;
    json.push('\n');
    Ok(json)
}
