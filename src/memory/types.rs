//! Memory record and sync-journal type definitions.

use serde::{Deserialize, Serialize};

use crate::dlp::DLP_TAG;

/// A memory record, matching the `memories` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    /// Sanitized UTF-8 content. Always a DLP fixed point on disk.
    pub content: String,
    /// L2-normalized embedding at the store's configured dimension.
    pub vector: Vec<f32>,
    /// Ordered tag list, no duplicates. Contains `dlp-redacted` when the
    /// sanitizer fired for this record.
    pub tags: Vec<String>,
    /// Origin path for indexed files, `"sync"` for replicated records.
    pub source: Option<String>,
    /// Confidence score in `[0.0, 1.0]`.
    pub confidence: f64,
    pub is_verified: bool,
    /// Millisecond epoch.
    pub created_at: i64,
    /// Millisecond epoch.
    pub updated_at: i64,
}

/// Fields for creating a new memory. The vector travels separately.
#[derive(Debug, Clone, Default)]
pub struct CreateMemory {
    pub content: String,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub confidence: Option<f64>,
}

/// Partial update for an existing memory. `None` fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub source: Option<String>,
    pub confidence: Option<f64>,
    pub is_verified: Option<bool>,
}

/// A search hit: the record plus its cosine distance from the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub distance: f64,
}

/// Mutation kind recorded in the sync journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncEventType {
    Add,
    Update,
    Delete,
}

impl SyncEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for SyncEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(Self::Add),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(format!("unknown sync event type: {s}")),
        }
    }
}

/// An immutable journal entry describing one memory mutation.
///
/// `encrypted_data` holds the envelope blob of the sanitized content for
/// ADD/UPDATE and is `None` for DELETE; `checksum` is the SHA-256 hex of the
/// plaintext sanitized content, with the same nullability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: String,
    pub event_type: SyncEventType,
    pub memory_id: String,
    pub encrypted_data: Option<String>,
    pub checksum: Option<String>,
    /// Millisecond epoch.
    pub timestamp: i64,
    /// Strictly increasing within the memory stream, starting at 1.
    pub sequence_num: i64,
}

/// Deduplicate a tag list preserving first-occurrence order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

/// Append the DLP tag unless already present.
pub fn ensure_dlp_tag(mut tags: Vec<String>) -> Vec<String> {
    if !tags.iter().any(|t| t == DLP_TAG) {
        tags.push(DLP_TAG.to_string());
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_tags_dedupes_preserving_order() {
        let tags = vec![
            "rust".to_string(),
            "programming".to_string(),
            "rust".to_string(),
            "".to_string(),
        ];
        assert_eq!(normalize_tags(tags), vec!["rust", "programming"]);
    }

    #[test]
    fn ensure_dlp_tag_is_idempotent() {
        let once = ensure_dlp_tag(vec!["a".to_string()]);
        let twice = ensure_dlp_tag(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.iter().filter(|t| *t == DLP_TAG).count(), 1);
    }

    #[test]
    fn sync_event_type_round_trips() {
        for t in [
            SyncEventType::Add,
            SyncEventType::Update,
            SyncEventType::Delete,
        ] {
            assert_eq!(t.as_str().parse::<SyncEventType>().unwrap(), t);
        }
        assert!("MERGE".parse::<SyncEventType>().is_err());
    }
}
