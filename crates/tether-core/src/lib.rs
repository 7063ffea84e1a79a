//! tether-core - Comment anchor engine
//!
//! Annotations ("anchors") are attached to a range of lines in a source file.
//! Instead of remembering line numbers, each anchor stores a small context
//! patch: the selected lines plus a few lines around them. Whenever the file
//! changes, the patch is re-applied to the new content and the selection is
//! read back from wherever it lands, so anchors follow the code as lines are
//! inserted or removed elsewhere.
//!
//! Anchors also remember the commit that was checked out when they were
//! captured. An anchor whose commit is no longer part of HEAD's history
//! (abandoned branch, rebased-away commit) is hidden, because its context
//! was taken from content the user no longer has.
//!
//! # Overview
//!
//! - [`Orchestrator`] is the entry point: [`Orchestrator::create_anchor`]
//!   captures and persists, [`Orchestrator::recover_visible`] locates.
//! - [`AnchorStore`] persists one JSON [`AnchorFile`] per source file.
//! - [`Patches`] is the line-based patch codec.
//! - [`recover`] is the pure recovery step, [`RevisionGate`] the visibility
//!   policy, and [`Vcs`] the repository abstraction ([`GitCli`] by default).
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tether_core::{AnchorSettings, GitCli, LineRange, Orchestrator};
//!
//! # async fn example() -> Result<(), tether_core::AnchorError> {
//! let orchestrator = Orchestrator::new(Arc::new(GitCli::default()), AnchorSettings::default());
//! let path = Path::new("/work/repo/src/main.rs");
//!
//! orchestrator
//!     .create_anchor(path, LineRange::new(9, 11), "fix this")
//!     .await?;
//!
//! let text = std::fs::read_to_string(path).unwrap_or_default();
//! let context = orchestrator.repo_context(path).await;
//! for visible in orchestrator.recover_visible(path, &text, &context).await? {
//!     println!("{}: {}", visible.range, visible.anchor.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod anchor;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod patch;
pub mod recovery;
pub mod store;
pub mod vcs;

pub use anchor::{Anchor, AnchorFile, LineRange};
pub use error::AnchorError;
pub use gate::{RepoContext, RevisionGate};
pub use orchestrator::{AnchorReport, AnchorSettings, AnchorStatus, Orchestrator, VisibleAnchor};
pub use patch::{Hunk, HunkLine, HunkOutcome, PatchError, Patches, split_lines};
pub use recovery::{Recovered, RecoveryOptions, locate, recover};
pub use store::{AnchorStore, StoreLayout};
pub use vcs::{GitCli, Vcs, VcsError, bounded, find_repo_root};
