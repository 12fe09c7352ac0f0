//! Record types stored in and returned by the index.

use crate::core::hasher::{Checksum, PerceptualHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

/// Free-form scalar metadata attached to an image
pub type InfoMap = Map<String, Value>;

/// One stored image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Surrogate key, stable across renames
    pub id: i64,
    /// `/`-separated path relative to the managed folder
    pub path: String,
    /// Exact fingerprint of the current file content
    pub checksum: Checksum,
    /// Checksum of the bytes originally submitted, when normalization rewrote them
    pub source_checksum: Option<Checksum>,
    /// Near-duplicate fingerprint; absent when skipped or undecodable
    pub perceptual_hash: Option<PerceptualHash>,
    pub created: DateTime<Utc>,
    /// Bumped on content change and on duplicate touch
    pub modified: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    pub(crate) info_json: String,
}

impl Image {
    pub fn relative_path(&self) -> &Path {
        Path::new(&self.path)
    }

    /// Last path segment
    pub fn filename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Decoded info mapping; a corrupt stored value reads as empty
    pub fn info(&self) -> InfoMap {
        match serde_json::from_str::<InfoMap>(&self.info_json) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %self.path, error = %e, "Ignoring corrupt info value");
                InfoMap::new()
            }
        }
    }

    /// The stored JSON object text
    pub fn info_json(&self) -> &str {
        &self.info_json
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Export shape: RFC 3339 timestamps, sorted tags, decoded info
    pub fn to_export(&self) -> ImageExport {
        ImageExport {
            path: self.path.clone(),
            checksum: self.checksum.to_string(),
            perceptual_hash: self.perceptual_hash.as_ref().map(PerceptualHash::to_hex),
            created: self.created,
            modified: self.modified,
            tags: self.tags.iter().cloned().collect(),
            info: self.info(),
        }
    }
}

impl Serialize for Image {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_export().serialize(serializer)
    }
}

/// Serializable view of an [`Image`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageExport {
    pub path: String,
    pub checksum: String,
    pub perceptual_hash: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub tags: Vec<String>,
    pub info: InfoMap,
}

/// Filters for [`super::ImageIndex::search`]; all given filters must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    /// Substring of the relative path
    pub filename: Option<String>,
    /// Each must be a substring of some tag
    pub tags: Vec<String>,
    /// Key present with a value containing the substring
    pub info: Vec<(String, String)>,
    /// Modified at or after
    pub since: Option<DateTime<Utc>>,
    /// Modified at or before
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filename(mut self, pattern: impl Into<String>) -> Self {
        self.filename = Some(pattern.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.push((key.into(), value.into()));
        self
    }

    pub fn since(mut self, at: DateTime<Utc>) -> Self {
        self.since = Some(at);
        self
    }

    pub fn until(mut self, at: DateTime<Utc>) -> Self {
        self.until = Some(at);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Trimmed, non-empty tags
pub fn clean_tags<S: AsRef<str>>(tags: &[S]) -> BTreeSet<String> {
    tags.iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image(info_json: &str) -> Image {
        let now = Utc::now();
        Image {
            id: 1,
            path: "trips/beach.png".to_string(),
            checksum: Checksum::of_bytes(b"beach"),
            source_checksum: None,
            perceptual_hash: Some(PerceptualHash::from_bytes(vec![0xab, 0x01])),
            created: now,
            modified: now,
            tags: ["sea", "sand"].iter().map(|s| s.to_string()).collect(),
            info_json: info_json.to_string(),
        }
    }

    #[test]
    fn filename_is_last_segment() {
        assert_eq!(image("{}").filename(), "beach.png");
    }

    #[test]
    fn info_decodes_stored_object() {
        let info = image(r#"{"camera":"x100","iso":200}"#).info();
        assert_eq!(info.get("iso"), Some(&json!(200)));
    }

    #[test]
    fn corrupt_info_reads_as_empty() {
        assert!(image("not json").info().is_empty());
    }

    #[test]
    fn export_sorts_tags_and_hex_encodes() {
        let export = image("{}").to_export();
        assert_eq!(export.tags, vec!["sand".to_string(), "sea".to_string()]);
        assert_eq!(export.perceptual_hash.as_deref(), Some("ab01"));

        let value = serde_json::to_value(&export).unwrap();
        assert!(value["created"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn clean_tags_trims_and_drops_empty() {
        let tags = clean_tags(&[" a ", "", "  ", "b", "a"]);
        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
