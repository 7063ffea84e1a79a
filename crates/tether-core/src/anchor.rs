//! Anchor data model and its on-disk JSON form.

use serde::{Deserialize, Serialize};

/// A span of lines, 0-indexed, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of lines covered. An inverted range covers nothing.
    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for LineRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start + 1, self.end + 1)
    }
}

/// One annotation, bound to a context patch rather than to line numbers.
///
/// Everything stored here is immutable once captured. The current position
/// is derived on every recovery pass and never written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    /// Unique within its [`AnchorFile`]
    pub id: String,
    /// User-authored text
    pub message: String,
    /// Commit that was checked out at capture time, empty without a repository
    #[serde(default)]
    pub base_revision: String,
    /// Serialized hunk, see [`crate::patch::Patches`]
    pub context_patch: String,
}

impl Anchor {
    /// Build a fresh anchor with a random id.
    pub fn new(
        message: impl Into<String>,
        base_revision: impl Into<String>,
        context_patch: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            message: message.into(),
            base_revision: base_revision.into(),
            context_patch: context_patch.into(),
        }
    }

    pub fn has_base_revision(&self) -> bool {
        !self.base_revision.is_empty()
    }
}

/// All anchors of one tracked source file, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorFile {
    #[serde(default)]
    pub anchors: Vec<Anchor>,
}

/// Layout written by early versions: one commit shared by the whole file.
#[derive(Debug, Deserialize)]
struct LegacyCommentFile {
    #[serde(default)]
    commit: String,
    patches: Vec<LegacyPatch>,
}

#[derive(Debug, Deserialize)]
struct LegacyPatch {
    message: String,
    patch: String,
}

impl From<LegacyCommentFile> for AnchorFile {
    fn from(legacy: LegacyCommentFile) -> Self {
        let anchors = legacy
            .patches
            .into_iter()
            .enumerate()
            .map(|(index, p)| Anchor {
                id: format!("legacy-{index}"),
                message: p.message,
                base_revision: legacy.commit.clone(),
                context_patch: p.patch,
            })
            .collect();
        Self { anchors }
    }
}

impl AnchorFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an anchor file, accepting the legacy shared-commit layout too.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.get("anchors").is_none() && value.get("patches").is_some() {
            let legacy: LegacyCommentFile = serde_json::from_value(value)?;
            return Ok(legacy.into());
        }
        serde_json::from_value(value)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Append an anchor, re-rolling its id if it collides with an existing one.
    pub fn push(&mut self, mut anchor: Anchor) {
        while self.get(&anchor.id).is_some() {
            anchor.id = uuid::Uuid::new_v4().simple().to_string();
        }
        self.anchors.push(anchor);
    }

    pub fn get(&self, id: &str) -> Option<&Anchor> {
        self.anchors.iter().find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_uses_camel_case_keys() {
        let mut file = AnchorFile::new();
        file.push(Anchor::new("fix this", "abc123", "@@ -1,1 +1,1 @@\n-a\n+a\n"));

        let json = file.to_json().unwrap();
        assert!(json.contains("\"anchors\""));
        assert!(json.contains("\"baseRevision\": \"abc123\""));
        assert!(json.contains("\"contextPatch\""));
        assert!(json.contains("\"message\": \"fix this\""));

        let back = AnchorFile::from_json(&json).unwrap();
        assert_eq!(back, file);
    }

    #[test]
    fn test_legacy_layout_is_migrated() {
        let json = r#"{
  "commit": "deadbeef",
  "patches": [
    { "message": "first", "patch": "@@ -1,1 +1,1 @@\n-a\n+a\n" },
    { "message": "second", "patch": "@@ -2,1 +2,1 @@\n-b\n+b\n" }
  ]
}"#;
        let file = AnchorFile::from_json(json).unwrap();
        assert_eq!(file.len(), 2);
        assert_eq!(file.anchors[0].id, "legacy-0");
        assert_eq!(file.anchors[1].message, "second");
        assert!(file.iter().all(|a| a.base_revision == "deadbeef"));
    }

    #[test]
    fn test_missing_anchors_key_is_empty() {
        let file = AnchorFile::from_json("{}").unwrap();
        assert!(file.is_empty());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(AnchorFile::from_json("not json").is_err());
        assert!(AnchorFile::from_json(r#"{"anchors": [{"id": 3}]}"#).is_err());
    }

    #[test]
    fn test_push_keeps_ids_unique() {
        let mut file = AnchorFile::new();
        let first = Anchor::new("a", "", "");
        let mut second = Anchor::new("b", "", "");
        second.id = first.id.clone();
        file.push(first);
        file.push(second);

        assert_eq!(file.len(), 2);
        assert_ne!(file.anchors[0].id, file.anchors[1].id);
        assert_eq!(file.anchors[1].message, "b");
    }

    #[test]
    fn test_line_range_len() {
        assert_eq!(LineRange::new(10, 12).len(), 3);
        assert_eq!(LineRange::new(4, 4).len(), 1);
        assert!(LineRange::new(5, 4).is_empty());
        assert_eq!(LineRange::new(9, 11).to_string(), "10-12");
    }
}
