//! Batch (re)indexing of folders.
//!
//! Coordinates the full flow: folder scan → per-file ingestion through the
//! [`Ledger`] → folder registry update. Files are ingested with bounded
//! parallelism; a single file's failure is recorded and does not abort the
//! batch.
//!
//! Cancellation is at file granularity: once the token fires no new file is
//! started, files already in flight finish their ingestion, and the rest
//! are counted as cancelled.

use std::path::PathBuf;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use docledger_core::models::IndexedFolder;
use docledger_core::{LedgerError, Result};

use crate::config::Config;
use crate::connector_fs::{self, FolderScan};
use crate::engine::Ledger;
use crate::progress::{IndexProgressEvent, IndexProgressReporter};

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub exclusions: Vec<String>,
    pub follow_symlinks: bool,
    pub concurrency: usize,
}

impl IndexOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            exclusions: config.ingest.exclusions.clone(),
            follow_symlinks: config.ingest.follow_symlinks,
            concurrency: config.ingest.concurrency,
        }
    }
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            exclusions: Vec::new(),
            follow_symlinks: false,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexingResult {
    pub folders: usize,
    /// Files that produced a new version.
    pub files_processed: u64,
    /// Files whose content was unchanged.
    pub files_skipped: u64,
    pub files_failed: u64,
    /// Files never started because the run was cancelled.
    pub files_cancelled: u64,
    pub cancelled: bool,
    pub errors: Vec<FileError>,
}

async fn scan(folder: PathBuf, options: &IndexOptions) -> Result<FolderScan> {
    let exclusions = options.exclusions.clone();
    let follow = options.follow_symlinks;
    tokio::task::spawn_blocking(move || connector_fs::scan_folder(&folder, &exclusions, follow))
        .await
        .map_err(|e| LedgerError::internal(format!("folder scan panicked: {e}")))?
        .map_err(LedgerError::from)
}

/// Index (or re-index) every file under `folders`.
///
/// Folders are registered with `project_id`, or keep their current project
/// when none is given. Unknown projects and missing folders are rejected
/// before anything is ingested.
pub async fn index(
    ledger: &Ledger,
    folders: &[PathBuf],
    project_id: Option<&str>,
    options: &IndexOptions,
    cancel: &CancellationToken,
    progress: &dyn IndexProgressReporter,
) -> Result<IndexingResult> {
    if folders.is_empty() {
        return Err(LedgerError::invalid("at least one folder is required"));
    }
    if let Some(pid) = project_id {
        if ledger.store().get_project(pid).await?.is_none() {
            return Err(LedgerError::not_found(
                format!("project {pid}"),
                "create the project first or list projects to see valid ids",
            ));
        }
    }
    let mut roots = Vec::with_capacity(folders.len());
    for folder in folders {
        match tokio::fs::metadata(folder).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => {
                return Err(LedgerError::invalid(format!(
                    "{} is not a directory",
                    folder.display()
                )))
            }
            Err(_) => {
                return Err(LedgerError::not_found(
                    format!("folder {}", folder.display()),
                    "check the path; removed folders must be re-created before indexing",
                ))
            }
        }
        // Folder rows and document paths are keyed by the canonical path.
        let root = tokio::fs::canonicalize(folder).await.map_err(|e| {
            LedgerError::Internal(
                anyhow::Error::new(e).context(format!("failed to resolve {}", folder.display())),
            )
        })?;
        if !roots.contains(&root) {
            roots.push(root);
        }
    }

    let mut result = IndexingResult::default();
    let started = std::time::Instant::now();

    for folder in &roots {
        if cancel.is_cancelled() {
            result.cancelled = true;
            break;
        }
        let key = folder.to_string_lossy().into_owned();
        progress.report(IndexProgressEvent::Discovering {
            folder: key.clone(),
        });

        let scanned = scan(folder.clone(), options).await?;
        for (path, error) in scanned.errors {
            tracing::warn!(path = %path, "unreadable entry skipped");
            result.files_failed += 1;
            result.errors.push(FileError { path, error });
        }

        let existing = ledger.get_folder(&key).await?;
        let folder_project = project_id
            .map(str::to_string)
            .or_else(|| existing.and_then(|f| f.project_id));
        ledger
            .record_folder(&IndexedFolder {
                path: key.clone(),
                project_id: folder_project.clone(),
                file_count: scanned.files.len() as u32,
                last_indexed: Some(Utc::now().timestamp()),
            })
            .await?;

        let total = scanned.files.len() as u64;
        let stamp = folder_project.as_deref();
        let mut outcomes = stream::iter(scanned.files)
            .map(|file| {
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (file, None);
                    }
                    let outcome = ledger.ingest_file(&file.path, stamp).await;
                    (file, Some(outcome))
                }
            })
            .buffer_unordered(options.concurrency.max(1));

        let mut n = 0u64;
        while let Some((file, outcome)) = outcomes.next().await {
            n += 1;
            match outcome {
                None => result.files_cancelled += 1,
                Some(Ok(o)) if o.created_new_version => result.files_processed += 1,
                Some(Ok(_)) => result.files_skipped += 1,
                Some(Err(e)) => {
                    tracing::warn!(path = %file.path.display(), code = e.code(), "file failed to index");
                    result.files_failed += 1;
                    result.errors.push(FileError {
                        path: file.path.to_string_lossy().into_owned(),
                        error: e.to_string(),
                    });
                }
            }
            progress.report(IndexProgressEvent::Ingesting {
                folder: key.clone(),
                n,
                total,
            });
        }
        result.folders += 1;
    }

    if cancel.is_cancelled() {
        result.cancelled = true;
    }
    tracing::info!(
        folders = result.folders,
        processed = result.files_processed,
        skipped = result.files_skipped,
        failed = result.files_failed,
        cancelled = result.files_cancelled,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "index finished"
    );
    Ok(result)
}
