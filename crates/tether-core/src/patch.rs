//! Line-oriented context patches.
//!
//! A patch is a list of hunks in unified-diff style:
//!
//! ```text
//! @@ -6,13 +6,13 @@
//!  context line
//! -selected line
//! +selected line
//!  context line
//! ```
//!
//! Header starts are 1-based in text and 0-based in memory. Application is
//! tolerant: a hunk whose context moved is searched for near its expected
//! offset, then anywhere, then by similarity, and every hunk reports its own
//! outcome so one failure does not sink the rest.

use std::fmt;
use std::str::FromStr;

use similar::{ChangeTag, TextDiff};

use crate::anchor::LineRange;

/// Split text into lines the way editors number them: a trailing newline
/// yields a final empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("line {line}: malformed hunk header `{header}`")]
    Header { line: usize, header: String },

    #[error("line {line}: content before the first hunk header")]
    Orphan { line: usize },

    #[error("line {line}: unknown line prefix {prefix:?}")]
    Prefix { line: usize, prefix: char },

    #[error(
        "hunk at line {line}: header announces {expected_old}/{expected_new} lines, body has {old}/{new}"
    )]
    Length {
        line: usize,
        expected_old: usize,
        expected_new: usize,
        old: usize,
        new: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Removed(String),
    Added(String),
}

impl HunkLine {
    pub fn text(&self) -> &str {
        match self {
            HunkLine::Context(s) | HunkLine::Removed(s) | HunkLine::Added(s) => s,
        }
    }

    fn prefix(&self) -> char {
        match self {
            HunkLine::Context(_) => ' ',
            HunkLine::Removed(_) => '-',
            HunkLine::Added(_) => '+',
        }
    }

    fn in_old(&self) -> bool {
        !matches!(self, HunkLine::Added(_))
    }

    fn in_new(&self) -> bool {
        !matches!(self, HunkLine::Removed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// 0-based first line on the old side
    pub start1: usize,
    pub len1: usize,
    /// 0-based first line on the new side
    pub start2: usize,
    pub len2: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    fn from_lines(start1: usize, start2: usize, lines: Vec<HunkLine>) -> Self {
        let len1 = lines.iter().filter(|l| l.in_old()).count();
        let len2 = lines.iter().filter(|l| l.in_new()).count();
        Self {
            start1,
            len1,
            start2,
            len2,
            lines,
        }
    }

    pub fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.in_old())
            .map(HunkLine::text)
            .collect()
    }

    pub fn new_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.in_new())
            .map(HunkLine::text)
            .collect()
    }

    /// Context lines before the first change.
    pub fn leading_context(&self) -> usize {
        self.lines
            .iter()
            .take_while(|l| matches!(l, HunkLine::Context(_)))
            .count()
    }

    pub fn removed(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l, HunkLine::Removed(_)))
            .count()
    }

    pub fn added(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l, HunkLine::Added(_)))
            .count()
    }
}

/// Where and how a hunk landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunkOutcome {
    /// `start2` is the hunk's first line in the patched text; `exact` is false
    /// when the match was only approximate.
    Applied { start2: usize, exact: bool },
    Failed,
}

impl HunkOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, HunkOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub text: String,
    pub outcomes: Vec<HunkOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patches {
    hunks: Vec<Hunk>,
}

impl Patches {
    /// Minimal line diff from `old` to `new`, keeping `context` unchanged lines
    /// around every change.
    pub fn make(old: &str, new: &str, context: usize) -> Self {
        let old_lines = split_lines(old);
        let new_lines = split_lines(new);
        let diff = TextDiff::from_slices(&old_lines, &new_lines);

        let mut hunks = Vec::new();
        for group in diff.grouped_ops(context) {
            let Some(first) = group.first() else {
                continue;
            };
            let start1 = first.old_range().start;
            let start2 = first.new_range().start;

            let mut lines = Vec::new();
            for op in &group {
                for change in diff.iter_changes(op) {
                    let text = change.value().to_string();
                    lines.push(match change.tag() {
                        ChangeTag::Equal => HunkLine::Context(text),
                        ChangeTag::Delete => HunkLine::Removed(text),
                        ChangeTag::Insert => HunkLine::Added(text),
                    });
                }
            }
            hunks.push(Hunk::from_lines(start1, start2, lines));
        }

        Self { hunks }
    }

    /// Capture `selection` of `text` together with up to `before` and `after`
    /// surrounding lines as a single self-referential hunk.
    ///
    /// Out-of-bounds selections are clamped to the last line.
    pub fn window(text: &str, selection: LineRange, before: usize, after: usize) -> Self {
        let lines = split_lines(text);
        let last = lines.len().saturating_sub(1);
        let start = selection.start.min(last);
        let end = selection.end.min(last).max(start);

        let context_start = start.saturating_sub(before);
        let context_end = (end + after + 1).min(lines.len());

        let mut hunk_lines = Vec::with_capacity(context_end - context_start + end - start + 1);
        hunk_lines.extend(
            lines[context_start..start]
                .iter()
                .map(|l| HunkLine::Context(l.to_string())),
        );
        hunk_lines.extend(
            lines[start..=end]
                .iter()
                .map(|l| HunkLine::Removed(l.to_string())),
        );
        hunk_lines.extend(
            lines[start..=end]
                .iter()
                .map(|l| HunkLine::Added(l.to_string())),
        );
        hunk_lines.extend(
            lines[end + 1..context_end]
                .iter()
                .map(|l| HunkLine::Context(l.to_string())),
        );

        Self {
            hunks: vec![Hunk::from_lines(context_start, context_start, hunk_lines)],
        }
    }

    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Apply every hunk to `text`.
    ///
    /// Fuzzy matches are accepted when the line-level similarity of the best
    /// candidate window reaches `min_similarity` (0.0..=1.0).
    pub fn apply(&self, text: &str, min_similarity: f64) -> Applied {
        let mut lines = split_lines(text);
        let mut outcomes = Vec::with_capacity(self.hunks.len());
        // How far the previous hunk landed from where it was expected.
        let mut drift: isize = 0;

        for hunk in &self.hunks {
            let old = hunk.old_lines();
            let new = hunk.new_lines();
            let expected = (hunk.start2 as isize + drift).max(0) as usize;

            match locate(&lines, &old, expected, min_similarity) {
                Some(found) => {
                    lines.splice(found.start..found.start + found.len, new.iter().copied());
                    drift = found.start as isize - hunk.start2 as isize;
                    outcomes.push(HunkOutcome::Applied {
                        start2: found.start,
                        exact: found.exact,
                    });
                }
                None => outcomes.push(HunkOutcome::Failed),
            }
        }

        Applied {
            text: lines.join("\n"),
            outcomes,
        }
    }

    pub fn to_text(&self) -> String {
        self.to_string()
    }

    pub fn from_text(text: &str) -> Result<Self, PatchError> {
        text.parse()
    }
}

struct Found {
    start: usize,
    len: usize,
    exact: bool,
}

fn locate(haystack: &[&str], needle: &[&str], expected: usize, min_similarity: f64) -> Option<Found> {
    if needle.is_empty() {
        return Some(Found {
            start: expected.min(haystack.len()),
            len: 0,
            exact: true,
        });
    }

    if needle.len() <= haystack.len() {
        let last = haystack.len() - needle.len();
        let expected = expected.min(last);
        let matches_at = |start: usize| haystack[start..start + needle.len()] == *needle;

        // Nearest exact match, searching outward from the expected offset.
        for distance in 0..=last {
            let below = expected.checked_sub(distance);
            let above = expected + distance;
            if let Some(start) = below
                && matches_at(start)
            {
                return Some(Found {
                    start,
                    len: needle.len(),
                    exact: true,
                });
            }
            if distance > 0 && above <= last && matches_at(above) {
                return Some(Found {
                    start: above,
                    len: needle.len(),
                    exact: true,
                });
            }
            if below.is_none() && above >= last {
                break;
            }
        }
    }

    let width = needle.len().min(haystack.len());
    if width == 0 {
        return None;
    }

    let mut best: Option<(f64, usize)> = None;
    for start in 0..=haystack.len() - width {
        let window = &haystack[start..start + width];
        let ratio = f64::from(TextDiff::from_slices(needle, window).ratio());
        let better = match best {
            None => true,
            Some((best_ratio, best_start)) => {
                ratio > best_ratio
                    || (ratio == best_ratio && start.abs_diff(expected) < best_start.abs_diff(expected))
            }
        };
        if better {
            best = Some((ratio, start));
        }
    }

    match best {
        Some((ratio, start)) if ratio >= min_similarity => Some(Found {
            start,
            len: width,
            exact: false,
        }),
        _ => None,
    }
}

fn header_start(start: usize, len: usize) -> usize {
    // Unified diffs name the line *before* an empty hunk.
    if len == 0 { start } else { start + 1 }
}

impl fmt::Display for Patches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for hunk in &self.hunks {
            writeln!(
                f,
                "@@ -{},{} +{},{} @@",
                header_start(hunk.start1, hunk.len1),
                hunk.len1,
                header_start(hunk.start2, hunk.len2),
                hunk.len2
            )?;
            for line in &hunk.lines {
                writeln!(f, "{}{}", line.prefix(), line.text())?;
            }
        }
        Ok(())
    }
}

/// Parse `S,L` (or bare `S`, meaning length 1) into a 0-based start and length.
fn parse_side(side: &str) -> Option<(usize, usize)> {
    let (start, len) = match side.split_once(',') {
        Some((s, l)) => (s.parse::<usize>().ok()?, l.parse::<usize>().ok()?),
        None => (side.parse::<usize>().ok()?, 1),
    };
    let start = if len == 0 { start } else { start.checked_sub(1)? };
    Some((start, len))
}

fn parse_header(header: &str) -> Option<(usize, usize, usize, usize)> {
    let body = header.strip_prefix("@@ ")?;
    let (ranges, _section) = body.split_once(" @@")?;
    let (old, new) = ranges.split_once(' ')?;
    let (start1, len1) = parse_side(old.strip_prefix('-')?)?;
    let (start2, len2) = parse_side(new.strip_prefix('+')?)?;
    Some((start1, len1, start2, len2))
}

struct PendingHunk {
    line: usize,
    start1: usize,
    len1: usize,
    start2: usize,
    len2: usize,
    lines: Vec<HunkLine>,
}

impl PendingHunk {
    fn finish(self) -> Result<Hunk, PatchError> {
        let hunk = Hunk::from_lines(self.start1, self.start2, self.lines);
        if hunk.len1 != self.len1 || hunk.len2 != self.len2 {
            return Err(PatchError::Length {
                line: self.line,
                expected_old: self.len1,
                expected_new: self.len2,
                old: hunk.len1,
                new: hunk.len2,
            });
        }
        Ok(hunk)
    }
}

impl FromStr for Patches {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut hunks = Vec::new();
        let mut pending: Option<PendingHunk> = None;

        for (index, raw) in s.split('\n').enumerate() {
            let line_no = index + 1;
            if raw.is_empty() {
                continue;
            }

            if raw.starts_with("@@") {
                if let Some(done) = pending.take() {
                    hunks.push(done.finish()?);
                }
                let (start1, len1, start2, len2) =
                    parse_header(raw).ok_or_else(|| PatchError::Header {
                        line: line_no,
                        header: raw.to_string(),
                    })?;
                pending = Some(PendingHunk {
                    line: line_no,
                    start1,
                    len1,
                    start2,
                    len2,
                    lines: Vec::new(),
                });
                continue;
            }

            let Some(current) = pending.as_mut() else {
                return Err(PatchError::Orphan { line: line_no });
            };

            let mut chars = raw.chars();
            let prefix = chars.next().unwrap_or(' ');
            let text = chars.as_str().to_string();
            match prefix {
                ' ' => current.lines.push(HunkLine::Context(text)),
                '-' => current.lines.push(HunkLine::Removed(text)),
                '+' => current.lines.push(HunkLine::Added(text)),
                // "\ No newline at end of file"
                '\\' => {}
                other => {
                    return Err(PatchError::Prefix {
                        line: line_no,
                        prefix: other,
                    });
                }
            }
        }

        if let Some(done) = pending.take() {
            hunks.push(done.finish()?);
        }

        Ok(Self { hunks })
    }
}
