//! Re-locating anchors in the current content of a file.
//!
//! Recovery is a pure function of the stored anchors and the text: each
//! anchor's context patch is applied to the text and the selection is read
//! back out of the hunk's landing position, with the leading context
//! stripped. A patch that cannot be placed, or cannot even be parsed, makes
//! that single anchor stale; the others are unaffected.

use tracing::{debug, warn};

use crate::anchor::{Anchor, AnchorFile, LineRange};
use crate::patch::{HunkOutcome, PatchError, Patches, split_lines};

/// Similarity needed to accept an approximate match, see [`Patches::apply`].
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryOptions {
    pub min_similarity: f64,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

/// Where an anchor was found, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    pub anchor: Anchor,
    /// `None` when the anchor is stale
    pub range: Option<LineRange>,
    /// Whether the context matched verbatim
    pub exact: bool,
}

impl Recovered {
    pub fn is_stale(&self) -> bool {
        self.range.is_none()
    }
}

/// Locate every anchor of `file` in `text`, preserving order.
pub fn recover(file: &AnchorFile, text: &str, options: &RecoveryOptions) -> Vec<Recovered> {
    file.iter()
        .map(|anchor| match locate(anchor, text, options) {
            Ok(Some((range, exact))) => Recovered {
                anchor: anchor.clone(),
                range: Some(range),
                exact,
            },
            Ok(None) => {
                debug!(anchor = %anchor.id, "anchor is stale");
                Recovered {
                    anchor: anchor.clone(),
                    range: None,
                    exact: false,
                }
            }
            Err(e) => {
                warn!(anchor = %anchor.id, error = %e, "unreadable context patch");
                Recovered {
                    anchor: anchor.clone(),
                    range: None,
                    exact: false,
                }
            }
        })
        .collect()
}

/// Current range of a single anchor and whether it matched exactly.
pub fn locate(
    anchor: &Anchor,
    text: &str,
    options: &RecoveryOptions,
) -> Result<Option<(LineRange, bool)>, PatchError> {
    let patches: Patches = anchor.context_patch.parse()?;
    let Some(hunk) = patches.hunks().first() else {
        return Ok(None);
    };

    let applied = patches.apply(text, options.min_similarity);
    let Some(HunkOutcome::Applied { start2, exact }) = applied.outcomes.first().copied() else {
        return Ok(None);
    };

    let last_line = split_lines(&applied.text).len().saturating_sub(1);
    let selection = hunk.removed().max(1);
    let start = (start2 + hunk.leading_context()).min(last_line);
    let end = (start + selection - 1).min(last_line);

    Ok(Some((LineRange::new(start, end), exact)))
}
