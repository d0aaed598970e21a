//! Core data models used throughout DocLedger.
//!
//! A logical document is identified by its `path`; every content change
//! appends a new [`Document`] row (a *version*). Timestamps are Unix seconds.

use serde::{Deserialize, Serialize};

/// One version row of a document.
///
/// For any path, version numbers are contiguous from 1 and exactly one row
/// has `is_latest == true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub path: String,
    pub filename: String,
    pub extension: String,
    pub size: u64,
    pub modified_at: i64,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub headings: Vec<String>,
    pub content_excerpt: String,
    pub content_hash: String,
    pub indexed_at: i64,
    pub version: u32,
    pub is_latest: bool,
    pub project_id: Option<String>,
}

/// A bounded slice of one document version's content.
///
/// `text` is always `content[start_offset..end_offset]` of the parent
/// version's normalized content. The id is stable within a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: u32,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A configured root folder. `project_id == None` means unassigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFolder {
    pub path: String,
    pub project_id: Option<String>,
    pub file_count: u32,
    pub last_indexed: Option<i64>,
}

/// A reference from an answer back to the chunk and version it used.
///
/// Produced at query time and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: String,
    pub filename: String,
    pub path: String,
    pub chunk_id: String,
    pub excerpt: String,
    /// The version the cited chunk belongs to.
    pub version: u32,
    /// The path's current latest version.
    pub latest_version: u32,
    pub is_latest: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionKind {
    All,
    LastNVersions,
    LastNDays,
}

impl RetentionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionKind::All => "all",
            RetentionKind::LastNVersions => "last_n_versions",
            RetentionKind::LastNDays => "last_n_days",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(RetentionKind::All),
            "last_n_versions" => Some(RetentionKind::LastNVersions),
            "last_n_days" => Some(RetentionKind::LastNDays),
            _ => None,
        }
    }
}

/// Singleton history-retention configuration.
///
/// Construct through [`crate::retention::policy`] so the value is validated
/// and the description is filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(rename = "type")]
    pub kind: RetentionKind,
    pub value: u32,
    pub description: String,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            kind: RetentionKind::All,
            value: 0,
            description: "Keep every version".to_string(),
        }
    }
}

/// Format a Unix timestamp as ISO 8601.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
