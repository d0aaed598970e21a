//! Storage abstraction for DocLedger.
//!
//! The [`Store`] trait is the append-only version ledger plus the search
//! index and the registry tables it depends on. Backends: the SQLite store
//! in the application crate and [`memory::InMemoryStore`] here.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Atomicity
//!
//! [`Store::append_version`] is a compare-and-swap on the path's latest
//! version. A backend must install the new row, its content, its chunks and
//! its postings, and flip the previous latest row's `is_latest`, as one
//! step that readers either fully observe or do not observe at all.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::chunk;
use crate::error::Result;
use crate::models::{Chunk, Document, IndexedFolder, Project, RetentionPolicy};

/// A fully prepared version waiting to be installed.
#[derive(Debug, Clone)]
pub struct NewVersion {
    /// The latest version the writer observed; `None` for a first version.
    pub expected_latest: Option<u32>,
    pub document: Document,
    pub chunks: Vec<Chunk>,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// Another writer moved the latest pointer first.
    Conflict { current: Option<u32> },
}

/// A document version that may match a query, with its chunks.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub document: Document,
    pub chunks: Vec<Chunk>,
}

/// Per-version bookkeeping used by the retention engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionInfo {
    pub document_id: String,
    pub path: String,
    pub version: u32,
    pub is_latest: bool,
    pub indexed_at: i64,
    pub content_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeStats {
    pub versions_deleted: usize,
    pub space_freed_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProjectReferences {
    pub documents: usize,
    pub folders: usize,
}

/// One inverted-index entry. `chunk_id == None` marks a title or filename
/// token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub term: String,
    pub chunk_id: Option<String>,
    pub positions: Vec<u32>,
}

/// Inverted-index entries for one version: chunk tokens with positions,
/// then title and filename tokens.
pub fn postings_for(document: &Document, chunks: &[Chunk]) -> Vec<Posting> {
    let mut out = Vec::new();
    for chunk in chunks {
        for (term, positions) in chunk::postings(&chunk.text) {
            out.push(Posting {
                term,
                chunk_id: Some(chunk.id.clone()),
                positions,
            });
        }
    }

    let meta = format!(
        "{} {}",
        document.title.as_deref().unwrap_or(""),
        document.filename
    );
    for (term, positions) in chunk::postings(&meta) {
        out.push(Posting {
            term,
            chunk_id: None,
            positions,
        });
    }
    out
}

/// Whether `path` lies inside `folder` (or is the folder itself).
pub fn under_folder(path: &str, folder: &str) -> bool {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        return true;
    }
    path == folder
        || path
            .strip_prefix(folder)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`latest_version`](Store::latest_version) | Current latest row for a path |
/// | [`append_version`](Store::append_version) | CAS-install a new version |
/// | [`list_versions`](Store::list_versions) | All rows for a path, newest first |
/// | [`search_candidates`](Store::search_candidates) | Inverted-index lookup |
/// | [`delete_versions`](Store::delete_versions) | Purge historical rows |
#[async_trait]
pub trait Store: Send + Sync {
    async fn latest_version(&self, path: &str) -> Result<Option<Document>>;

    /// Install a new version if the latest version still equals
    /// `expected_latest`, otherwise report a conflict without writing.
    async fn append_version(&self, new: NewVersion) -> Result<AppendOutcome>;

    /// Every version of `path`, newest first. Empty when unknown.
    async fn list_versions(&self, path: &str) -> Result<Vec<Document>>;

    async fn get_version(&self, path: &str, version: u32) -> Result<Option<Document>>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Full normalized text of one version.
    async fn get_content(&self, document_id: &str) -> Result<Option<String>>;

    /// Chunks of one version ordered by index.
    async fn get_chunks(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Remove every version of `path` with chunks, postings and content.
    /// Returns the number of version rows removed.
    async fn delete_path(&self, path: &str) -> Result<usize>;

    /// Paths whose latest version lies under `folder`, optionally limited
    /// to one owning project.
    async fn paths_under(&self, folder: &str, project_id: Option<&str>) -> Result<Vec<String>>;

    async fn all_versions(&self) -> Result<Vec<VersionInfo>>;

    /// Delete the given version rows. Latest rows are never deleted even if
    /// listed.
    async fn delete_versions(&self, document_ids: &[String]) -> Result<PurgeStats>;

    /// Versions containing at least one of `terms` in a chunk, title or
    /// filename. Only latest versions unless `include_historical`.
    async fn search_candidates(
        &self,
        terms: &[String],
        include_historical: bool,
    ) -> Result<Vec<Candidate>>;

    /// Latest versions, most recently modified first, plus the total count.
    async fn list_latest(
        &self,
        project_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Document>, usize)>;

    async fn retention_policy(&self) -> Result<RetentionPolicy>;

    async fn set_retention_policy(&self, policy: &RetentionPolicy) -> Result<()>;

    async fn create_project(&self, project: &Project) -> Result<()>;

    async fn get_project(&self, id: &str) -> Result<Option<Project>>;

    async fn list_projects(&self) -> Result<Vec<Project>>;

    async fn delete_project(&self, id: &str) -> Result<bool>;

    /// Distinct paths with any version stamped with the project, and
    /// folders assigned to it.
    async fn project_references(&self, id: &str) -> Result<ProjectReferences>;

    async fn upsert_folder(&self, folder: &IndexedFolder) -> Result<()>;

    async fn get_folder(&self, path: &str) -> Result<Option<IndexedFolder>>;

    async fn list_folders(&self) -> Result<Vec<IndexedFolder>>;

    /// Reassign a folder and restamp every version of every document under
    /// it. Returns the number of version rows restamped.
    async fn assign_folder(&self, path: &str, project_id: Option<&str>) -> Result<usize>;

    /// Remove a folder row and every document under it owned by the
    /// folder's project. Returns the number of paths removed.
    async fn remove_folder(&self, path: &str) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_prefix_respects_separators() {
        assert!(under_folder("/notes/a.md", "/notes"));
        assert!(under_folder("/notes/a.md", "/notes/"));
        assert!(under_folder("/notes", "/notes"));
        assert!(!under_folder("/notes-old/a.md", "/notes"));
        assert!(!under_folder("/other/a.md", "/notes"));
    }
}
