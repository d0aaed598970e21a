//! Version Store contract on top of a [`Store`] backend.
//!
//! `ingest` appends a version only when the content hash changes. The
//! append is an optimistic compare-and-swap on the path's latest version;
//! losing writers re-read the latest version and retry a bounded number of
//! times before surfacing `CONFLICT`.

use serde::Serialize;
use uuid::Uuid;

use crate::chunk::{build_chunks, PreparedContent};
use crate::error::{LedgerError, Result};
use crate::models::Document;
use crate::store::{AppendOutcome, NewVersion, Store};

/// File-level facts about the content being ingested.
#[derive(Debug, Clone)]
pub struct IngestInput {
    pub path: String,
    pub filename: String,
    pub extension: String,
    pub size: u64,
    pub modified_at: i64,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub created_new_version: bool,
    pub version: u32,
    pub document_id: String,
}

/// Reject version numbers that can never exist.
pub fn validate_version(version: u32) -> Result<()> {
    if version == 0 {
        return Err(LedgerError::invalid("version numbers start at 1"));
    }
    Ok(())
}

fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

/// Append a version for `input.path` unless its latest version already has
/// `prepared.content_hash`.
pub async fn ingest(
    store: &dyn Store,
    input: &IngestInput,
    prepared: &PreparedContent,
    max_attempts: u32,
    now: i64,
) -> Result<IngestOutcome> {
    if input.path.is_empty() {
        return Err(LedgerError::invalid("path must not be empty"));
    }
    let attempts = max_attempts.max(1);

    for attempt in 1..=attempts {
        let latest = store.latest_version(&input.path).await?;
        if let Some(latest) = &latest {
            if latest.content_hash == prepared.content_hash {
                tracing::debug!(
                    path = %input.path,
                    version = latest.version,
                    hash = short_hash(&prepared.content_hash),
                    "content unchanged"
                );
                return Ok(IngestOutcome {
                    created_new_version: false,
                    version: latest.version,
                    document_id: latest.id.clone(),
                });
            }
        }

        let expected = latest.as_ref().map(|d| d.version);
        let version = expected.map(|v| v + 1).unwrap_or(1);
        let document = Document {
            id: Uuid::new_v4().to_string(),
            path: input.path.clone(),
            filename: input.filename.clone(),
            extension: input.extension.clone(),
            size: input.size,
            modified_at: input.modified_at,
            title: prepared.title.clone(),
            tags: prepared.tags.clone(),
            headings: prepared.headings.clone(),
            content_excerpt: prepared.excerpt.clone(),
            content_hash: prepared.content_hash.clone(),
            indexed_at: now,
            version,
            is_latest: true,
            project_id: input.project_id.clone(),
        };
        let chunks = build_chunks(&document.id, prepared);
        let document_id = document.id.clone();
        let chunk_count = chunks.len();

        let outcome = store
            .append_version(NewVersion {
                expected_latest: expected,
                document,
                chunks,
                content: prepared.text.clone(),
            })
            .await?;

        match outcome {
            AppendOutcome::Appended => {
                tracing::info!(
                    path = %input.path,
                    version,
                    hash = short_hash(&prepared.content_hash),
                    chunks = chunk_count,
                    "version appended"
                );
                return Ok(IngestOutcome {
                    created_new_version: true,
                    version,
                    document_id,
                });
            }
            AppendOutcome::Conflict { current } => {
                tracing::debug!(
                    path = %input.path,
                    attempt,
                    expected = ?expected,
                    current = ?current,
                    "lost version race, retrying"
                );
            }
        }
    }

    Err(LedgerError::Conflict {
        path: input.path.clone(),
        message: format!("lost the version race {attempts} times; retry the ingestion"),
    })
}

/// Every version of `path`, newest first.
pub async fn list_versions(store: &dyn Store, path: &str) -> Result<Vec<Document>> {
    let versions = store.list_versions(path).await?;
    if versions.is_empty() {
        return Err(LedgerError::not_found(
            format!("path {path}"),
            "index the file or its folder first",
        ));
    }
    Ok(versions)
}

pub async fn get_version(store: &dyn Store, path: &str, version: u32) -> Result<Document> {
    validate_version(version)?;
    if let Some(doc) = store.get_version(path, version).await? {
        return Ok(doc);
    }
    match store.latest_version(path).await? {
        Some(latest) => Err(LedgerError::not_found(
            format!("version {version} of {path}"),
            format!(
                "latest version is {}; older versions may have been purged",
                latest.version
            ),
        )),
        None => Err(LedgerError::not_found(
            format!("path {path}"),
            "index the file or its folder first",
        )),
    }
}

/// Remove every version of `path`. Returns the number of rows removed.
pub async fn delete(store: &dyn Store, path: &str) -> Result<usize> {
    let removed = store.delete_path(path).await?;
    if removed == 0 {
        return Err(LedgerError::not_found(
            format!("path {path}"),
            "nothing is indexed under this path",
        ));
    }
    tracing::info!(path = %path, versions = removed, "path deleted");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{prepare, ChunkingParams};
    use crate::store::memory::InMemoryStore;

    fn input(path: &str) -> IngestInput {
        IngestInput {
            path: path.to_string(),
            filename: path.rsplit('/').next().unwrap_or(path).to_string(),
            extension: "md".to_string(),
            size: 0,
            modified_at: 1_700_000_000,
            project_id: None,
        }
    }

    fn content(text: &str) -> PreparedContent {
        prepare(text.as_bytes(), "md", "docker", &ChunkingParams::default())
    }

    #[tokio::test]
    async fn identical_content_is_idempotent() {
        let store = InMemoryStore::new();
        let path = "notes/docker.md";
        let first = ingest(&store, &input(path), &content("# Docker\nUse volumes."), 3, 1)
            .await
            .unwrap();
        let second = ingest(&store, &input(path), &content("# Docker\nUse volumes."), 3, 2)
            .await
            .unwrap();
        assert!(first.created_new_version);
        assert!(!second.created_new_version);
        assert_eq!(second.version, 1);
        assert_eq!(store.list_versions(path).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn changed_content_appends_contiguous_versions() {
        let store = InMemoryStore::new();
        let path = "notes/a.md";
        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            let out = ingest(&store, &input(path), &content(text), 3, i as i64)
                .await
                .unwrap();
            assert_eq!(out.version, i as u32 + 1);
        }
        let versions = list_versions(&store, path).await.unwrap();
        let numbers: Vec<u32> = versions.iter().map(|d| d.version).collect();
        assert_eq!(numbers, vec![3, 2, 1]);
        assert_eq!(versions.iter().filter(|d| d.is_latest).count(), 1);
    }

    #[tokio::test]
    async fn version_zero_is_invalid() {
        let store = InMemoryStore::new();
        let err = get_version(&store, "a.md", 0).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn missing_version_is_not_found_with_hint() {
        let store = InMemoryStore::new();
        ingest(&store, &input("a.md"), &content("x"), 3, 0).await.unwrap();
        let err = get_version(&store, "a.md", 7).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(err.to_string().contains("latest version is 1"));

        let err = list_versions(&store, "nope.md").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn delete_unknown_path_is_not_found() {
        let store = InMemoryStore::new();
        let err = delete(&store, "ghost.md").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
