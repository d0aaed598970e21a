//! Collaborator-facing facade over the core engines.
//!
//! [`Ledger`] owns the store handle, the per-path writer locks and the
//! tuning settings. Every exposed contract (tools, CLI, server) goes through
//! it, so the locking discipline lives in one place:
//!
//! - ingestion and deletion of a path hold that path's lock;
//! - a purge batch holds the locks of every path it touches;
//! - folder reassignment and removal hold the locks of the paths under the
//!   folder;
//! - searches, retrieval, reads and diffs take no locks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use docledger_core::chunk::{self, ChunkingParams};
use docledger_core::diff::{self, DiffSettings, VersionDiff};
use docledger_core::models::{Citation, Document, IndexedFolder, Project, RetentionPolicy};
use docledger_core::retention::{self, PurgeReport};
use docledger_core::retrieval::{self, RetrievalResponse, RetrievalSettings};
use docledger_core::search::{self, SearchRequest, SearchResponse, SearchSettings};
use docledger_core::store::{under_folder, Store};
use docledger_core::versions::{self, IngestInput, IngestOutcome};
use docledger_core::{LedgerError, Result};

use crate::config::Config;
use crate::db;
use crate::locks::PathLocks;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Copy)]
pub struct LedgerSettings {
    pub chunking: ChunkingParams,
    pub search: SearchSettings,
    pub retrieval: RetrievalSettings,
    pub diff: DiffSettings,
    pub max_attempts: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            chunking: ChunkingParams::default(),
            search: SearchSettings::default(),
            retrieval: RetrievalSettings::default(),
            diff: DiffSettings::default(),
            max_attempts: 3,
        }
    }
}

impl LedgerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunking: config.chunking_params(),
            search: config.search_settings(),
            retrieval: config.retrieval_settings(),
            diff: config.diff_settings(),
            max_attempts: config.ingest.max_attempts,
        }
    }
}

/// A version read back with its full content.
#[derive(Debug, Clone, Serialize)]
pub struct NoteView {
    pub document: Document,
    pub content: String,
    pub latest_version: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteList {
    pub notes: Vec<Document>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

pub struct Ledger {
    store: Arc<dyn Store>,
    locks: PathLocks,
    settings: LedgerSettings,
}

fn now() -> i64 {
    Utc::now().timestamp()
}

fn io_error(path: &Path, err: std::io::Error) -> LedgerError {
    if err.kind() == std::io::ErrorKind::NotFound {
        LedgerError::not_found(
            format!("file {}", path.display()),
            "check the path and try again",
        )
    } else {
        LedgerError::Internal(
            anyhow::Error::new(err).context(format!("failed to read {}", path.display())),
        )
    }
}

/// The key a file is stored under: its canonical parent directory joined
/// with its own name, so a symlinked file keeps the name it was found under.
async fn path_key(file: &Path) -> std::io::Result<PathBuf> {
    let parent = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = tokio::fs::canonicalize(parent).await?;
    Ok(match file.file_name() {
        Some(name) => dir.join(name),
        None => dir,
    })
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>, settings: LedgerSettings) -> Self {
        Self {
            store,
            locks: PathLocks::new(),
            settings,
        }
    }

    /// Connect to the configured database, run migrations and wrap the
    /// SQLite store.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        Ok(Self::new(
            Arc::new(SqliteStore::new(pool)),
            LedgerSettings::from_config(config),
        ))
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    async fn require_project(&self, project_id: &str) -> Result<Project> {
        self.store.get_project(project_id).await?.ok_or_else(|| {
            LedgerError::not_found(
                format!("project {project_id}"),
                "create the project first or list projects to see valid ids",
            )
        })
    }

    /// The project a new version of `path` is stamped with: the explicit
    /// one if given, else the project of the innermost registered folder.
    async fn owning_project(&self, path: &str, explicit: Option<&str>) -> Result<Option<String>> {
        if let Some(project_id) = explicit {
            self.require_project(project_id).await?;
            return Ok(Some(project_id.to_string()));
        }
        let folders = self.store.list_folders().await?;
        Ok(folders
            .into_iter()
            .filter(|f| under_folder(path, &f.path))
            .max_by_key(|f| f.path.len())
            .and_then(|f| f.project_id))
    }

    // ── Version Store ───────────────────────────────────────────────────

    /// Ingest raw bytes for `path` (the editor save-event entry point).
    pub async fn ingest_bytes(
        &self,
        path: &str,
        bytes: &[u8],
        modified_at: i64,
        project_id: Option<&str>,
    ) -> Result<IngestOutcome> {
        if path.trim().is_empty() {
            return Err(LedgerError::invalid("path must not be empty"));
        }
        let project_id = self.owning_project(path, project_id).await?;

        let p = Path::new(path);
        let filename = p
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        let extension = p
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let stem = p
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let prepared = chunk::prepare(bytes, &extension, &stem, &self.settings.chunking);
        if !prepared.indexable {
            tracing::debug!(path = %path, extension = %extension, "indexing metadata only");
        }
        let input = IngestInput {
            path: path.to_string(),
            filename,
            extension,
            size: bytes.len() as u64,
            modified_at,
            project_id,
        };

        let _guard = self.locks.lock(path).await;
        versions::ingest(
            self.store.as_ref(),
            &input,
            &prepared,
            self.settings.max_attempts,
            now(),
        )
        .await
    }

    /// Read a file from disk and ingest it under its absolute path, with
    /// the parent directory canonicalized.
    pub async fn ingest_file(&self, file: &Path, project_id: Option<&str>) -> Result<IngestOutcome> {
        let metadata = tokio::fs::metadata(file).await.map_err(|e| io_error(file, e))?;
        if !metadata.is_file() {
            return Err(LedgerError::invalid(format!(
                "{} is not a regular file",
                file.display()
            )));
        }
        let modified_at = metadata
            .modified()
            .ok()
            .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let bytes = tokio::fs::read(file).await.map_err(|e| io_error(file, e))?;
        let key = path_key(file).await.map_err(|e| io_error(file, e))?;
        self.ingest_bytes(&key.to_string_lossy(), &bytes, modified_at, project_id)
            .await
    }

    pub async fn get_document_versions(&self, path: &str) -> Result<Vec<Document>> {
        versions::list_versions(self.store.as_ref(), path).await
    }

    /// Read a note by document id or path, optionally at a specific version.
    pub async fn read_note(&self, id_or_path: &str, version: Option<u32>) -> Result<NoteView> {
        if id_or_path.trim().is_empty() {
            return Err(LedgerError::invalid("id or path must not be empty"));
        }
        let by_id = self.store.get_document(id_or_path).await?;
        let document = match (by_id, version) {
            (Some(doc), None) => doc,
            (Some(doc), Some(v)) => versions::get_version(self.store.as_ref(), &doc.path, v).await?,
            (None, Some(v)) => versions::get_version(self.store.as_ref(), id_or_path, v).await?,
            (None, None) => self.store.latest_version(id_or_path).await?.ok_or_else(|| {
                LedgerError::not_found(
                    format!("document {id_or_path}"),
                    "pass a document id or an indexed path",
                )
            })?,
        };

        let content = self
            .store
            .get_content(&document.id)
            .await?
            .unwrap_or_default();
        let latest_version = if document.is_latest {
            document.version
        } else {
            self.store
                .latest_version(&document.path)
                .await?
                .map(|d| d.version)
                .unwrap_or(document.version)
        };
        Ok(NoteView {
            document,
            content,
            latest_version,
        })
    }

    pub async fn delete_path(&self, path: &str) -> Result<usize> {
        let _guard = self.locks.lock(path).await;
        versions::delete(self.store.as_ref(), path).await
    }

    pub async fn list_notes(
        &self,
        project_id: Option<&str>,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<NoteList> {
        let limit = search::resolve_limit(limit, &self.settings.search)?;
        if let Some(pid) = project_id {
            self.require_project(pid).await?;
        }
        let (notes, total) = self.store.list_latest(project_id, limit, offset).await?;
        Ok(NoteList {
            notes,
            total,
            limit,
            offset,
        })
    }

    // ── Search, retrieval, diff ─────────────────────────────────────────

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        search::search(self.store.as_ref(), request, &self.settings.search).await
    }

    /// Chunks and citations for the external answer-synthesis step.
    pub async fn answer_question(
        &self,
        question: &str,
        top_k: Option<usize>,
        project_filter: Option<&str>,
    ) -> Result<RetrievalResponse> {
        retrieval::retrieve_context(
            self.store.as_ref(),
            question,
            top_k,
            project_filter,
            &self.settings.retrieval,
        )
        .await
    }

    pub async fn resolve_citations(&self, citations: &[Citation]) -> Result<Vec<Citation>> {
        retrieval::resolve_citations(self.store.as_ref(), citations).await
    }

    pub async fn compare_versions(
        &self,
        path: &str,
        version_a: u32,
        version_b: u32,
    ) -> Result<VersionDiff> {
        diff::compare_versions(
            self.store.as_ref(),
            path,
            version_a,
            version_b,
            &self.settings.diff,
        )
        .await
    }

    // ── Retention ───────────────────────────────────────────────────────

    pub async fn get_retention_policy(&self) -> Result<RetentionPolicy> {
        retention::get_policy(self.store.as_ref()).await
    }

    pub async fn set_retention_policy(&self, kind: &str, value: Option<u32>) -> Result<RetentionPolicy> {
        let policy = retention::parse_policy(kind, value)?;
        retention::set_policy(self.store.as_ref(), &policy).await?;
        Ok(policy)
    }

    /// Evaluate the stored policy and, unless `dry_run`, delete the
    /// candidates while holding the locks of every path involved.
    pub async fn purge_history(&self, dry_run: bool) -> Result<PurgeReport> {
        let store = self.store.as_ref();
        let at = now();
        let (policy, candidates) = retention::plan(store, at).await?;
        if dry_run {
            tracing::info!(candidates = candidates.len(), "purge dry run");
            return Ok(retention::report(policy, candidates, true, None));
        }

        let paths: Vec<String> = candidates.iter().map(|c| c.path.clone()).collect();
        let _guard = self.locks.lock_many(&paths).await;

        // Re-plan under the locks; restrict to the locked paths.
        let (policy, candidates) = retention::plan(store, at).await?;
        let candidates: Vec<_> = candidates
            .into_iter()
            .filter(|c| paths.contains(&c.path))
            .collect();
        let stats = retention::execute(store, &candidates).await?;
        tracing::info!(
            paths = paths.len(),
            versions = stats.versions_deleted,
            bytes = stats.space_freed_bytes,
            "history purged"
        );
        Ok(retention::report(policy, candidates, false, Some(stats)))
    }

    // ── Projects and folders ────────────────────────────────────────────

    pub async fn create_project(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Project> {
        if id.trim().is_empty() || name.trim().is_empty() {
            return Err(LedgerError::invalid("project id and name must not be empty"));
        }
        let ts = now();
        let project = Project {
            id: id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: ts,
            updated_at: ts,
        };
        self.store.create_project(&project).await?;
        tracing::info!(project = %id, "project created");
        Ok(project)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.store.list_projects().await
    }

    /// Delete a project that no document or folder references any more.
    pub async fn delete_project(&self, id: &str) -> Result<()> {
        self.require_project(id).await?;
        let refs = self.store.project_references(id).await?;
        if refs.documents > 0 || refs.folders > 0 {
            return Err(LedgerError::invalid(format!(
                "project '{id}' is still referenced by {} document(s) and {} folder(s); \
                 reassign or remove its folders first",
                refs.documents, refs.folders
            )));
        }
        self.store.delete_project(id).await?;
        tracing::info!(project = %id, "project deleted");
        Ok(())
    }

    pub async fn list_folders(&self) -> Result<Vec<IndexedFolder>> {
        self.store.list_folders().await
    }

    /// Register a folder (or refresh its counters) after a scan.
    pub async fn record_folder(&self, folder: &IndexedFolder) -> Result<()> {
        if let Some(pid) = &folder.project_id {
            self.require_project(pid).await?;
        }
        self.store.upsert_folder(folder).await
    }

    pub async fn get_folder(&self, path: &str) -> Result<Option<IndexedFolder>> {
        self.store.get_folder(path).await
    }

    /// Move a folder to another project (or unassign it) and restamp every
    /// version of every document under it.
    pub async fn assign_folder(&self, path: &str, project_id: Option<&str>) -> Result<usize> {
        if let Some(pid) = project_id {
            self.require_project(pid).await?;
        }
        let paths = self.store.paths_under(path, None).await?;
        let _guard = self.locks.lock_many(&paths).await;
        let restamped = self.store.assign_folder(path, project_id).await?;
        tracing::info!(folder = %path, project = ?project_id, versions = restamped, "folder reassigned");
        Ok(restamped)
    }

    /// Remove a folder and every document under it owned by the folder's
    /// project.
    pub async fn remove_folder(&self, path: &str) -> Result<usize> {
        let folder = self.store.get_folder(path).await?.ok_or_else(|| {
            LedgerError::not_found(
                format!("folder {path}"),
                "list folders to see registered roots",
            )
        })?;
        let paths = self
            .store
            .paths_under(path, folder.project_id.as_deref())
            .await?;
        let _guard = self.locks.lock_many(&paths).await;
        let removed = self.store.remove_folder(path).await?;
        tracing::info!(folder = %path, documents = removed, "folder removed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docledger_core::store::memory::InMemoryStore;

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(InMemoryStore::new()), LedgerSettings::default())
    }

    #[tokio::test]
    async fn ingest_stamps_project_of_registered_folder() {
        let l = ledger();
        l.create_project("work", "Work", None).await.unwrap();
        l.record_folder(&IndexedFolder {
            path: "/notes".to_string(),
            project_id: Some("work".to_string()),
            file_count: 0,
            last_indexed: None,
        })
        .await
        .unwrap();

        l.ingest_bytes("/notes/a.md", b"# A\nbody", 10, None).await.unwrap();
        let note = l.read_note("/notes/a.md", None).await.unwrap();
        assert_eq!(note.document.project_id.as_deref(), Some("work"));
    }

    #[tokio::test]
    async fn ingest_with_unknown_project_is_not_found() {
        let l = ledger();
        let err = l
            .ingest_bytes("/notes/a.md", b"text", 10, Some("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn read_note_by_id_and_by_version() {
        let l = ledger();
        let v1 = l.ingest_bytes("n.md", b"first", 1, None).await.unwrap();
        l.ingest_bytes("n.md", b"second", 2, None).await.unwrap();

        let by_id = l.read_note(&v1.document_id, None).await.unwrap();
        assert_eq!(by_id.document.version, 1);
        assert_eq!(by_id.content, "first");
        assert_eq!(by_id.latest_version, 2);

        let latest = l.read_note("n.md", None).await.unwrap();
        assert_eq!(latest.content, "second");

        let old = l.read_note("n.md", Some(1)).await.unwrap();
        assert!(!old.document.is_latest);

        assert_eq!(l.read_note("n.md", Some(0)).await.unwrap_err().code(), "INVALID_INPUT");
        assert_eq!(l.read_note("n.md", Some(9)).await.unwrap_err().code(), "NOT_FOUND");
        assert_eq!(l.read_note("missing.md", None).await.unwrap_err().code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn referenced_project_cannot_be_deleted() {
        let l = ledger();
        l.create_project("p", "P", None).await.unwrap();
        l.ingest_bytes("x.md", b"text", 1, Some("p")).await.unwrap();

        let err = l.delete_project("p").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");

        l.delete_path("x.md").await.unwrap();
        l.delete_project("p").await.unwrap();
        assert!(l.list_projects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_policy_rejects_unknown_kind() {
        let l = ledger();
        let err = l.set_retention_policy("forever", None).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        let p = l.set_retention_policy("last_n_versions", Some(2)).await.unwrap();
        assert_eq!(l.get_retention_policy().await.unwrap(), p);
    }
}
