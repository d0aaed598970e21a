//! SQLite-backed [`Store`] implementation.
//!
//! Each trait method delegates to an inherent method that works in
//! `anyhow::Result`; database failures surface as
//! [`LedgerError::Internal`](docledger_core::LedgerError::Internal).
//!
//! Version installs run in one transaction whose first statement is a write,
//! so concurrent writers serialize on SQLite's write lock and the
//! compare-and-swap on `is_latest` is decided inside the lock. Readers in WAL
//! mode see either the whole version (row, content, chunks, postings) or
//! none of it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use docledger_core::models::{
    Chunk, Document, IndexedFolder, Project, RetentionKind, RetentionPolicy,
};
use docledger_core::store::{
    postings_for, under_folder, AppendOutcome, Candidate, NewVersion, ProjectReferences,
    PurgeStats, Store, VersionInfo,
};
use docledger_core::LedgerError;

const DOC_COLUMNS: &str = "id, path, filename, extension, size, modified_at, title, tags_json, \
     headings_json, content_excerpt, content_hash, indexed_at, version, is_latest, project_id";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

fn doc_from_row(row: &SqliteRow) -> Result<Document> {
    let tags_json: String = row.try_get("tags_json")?;
    let headings_json: String = row.try_get("headings_json")?;
    let size: i64 = row.try_get("size")?;
    let version: i64 = row.try_get("version")?;
    let is_latest: i64 = row.try_get("is_latest")?;

    Ok(Document {
        id: row.try_get("id")?,
        path: row.try_get("path")?,
        filename: row.try_get("filename")?,
        extension: row.try_get("extension")?,
        size: size.max(0) as u64,
        modified_at: row.try_get("modified_at")?,
        title: row.try_get("title")?,
        tags: serde_json::from_str(&tags_json).context("corrupt tags_json")?,
        headings: serde_json::from_str(&headings_json).context("corrupt headings_json")?,
        content_excerpt: row.try_get("content_excerpt")?,
        content_hash: row.try_get("content_hash")?,
        indexed_at: row.try_get("indexed_at")?,
        version: u32::try_from(version).context("version out of range")?,
        is_latest: is_latest != 0,
        project_id: row.try_get("project_id")?,
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<Chunk> {
    let chunk_index: i64 = row.try_get("chunk_index")?;
    let start: i64 = row.try_get("start_offset")?;
    let end: i64 = row.try_get("end_offset")?;
    Ok(Chunk {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        chunk_index: chunk_index as u32,
        text: row.try_get("text")?,
        start_offset: start as usize,
        end_offset: end as usize,
        hash: row.try_get("hash")?,
    })
}

fn folder_from_row(row: &SqliteRow) -> Result<IndexedFolder> {
    let file_count: i64 = row.try_get("file_count")?;
    Ok(IndexedFolder {
        path: row.try_get("path")?,
        project_id: row.try_get("project_id")?,
        file_count: file_count.max(0) as u32,
        last_indexed: row.try_get("last_indexed")?,
    })
}

fn project_from_row(row: &SqliteRow) -> Result<Project> {
    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Delete one version row and everything derived from it.
async fn delete_version_tx(tx: &mut Transaction<'_, Sqlite>, id: &str) -> Result<u64> {
    for table in ["postings", "chunks", "contents"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE document_id = ?"))
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    let res = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(res.rows_affected())
}

async fn delete_path_tx(tx: &mut Transaction<'_, Sqlite>, path: &str) -> Result<usize> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM documents WHERE path = ?")
        .bind(path)
        .fetch_all(&mut **tx)
        .await?;
    let mut removed = 0;
    for id in &ids {
        removed += delete_version_tx(tx, id).await? as usize;
    }
    Ok(removed)
}

async fn current_latest(pool: &SqlitePool, path: &str) -> Result<Option<u32>> {
    let v: Option<i64> =
        sqlx::query_scalar("SELECT version FROM documents WHERE path = ? AND is_latest = 1")
            .bind(path)
            .fetch_optional(pool)
            .await?;
    Ok(v.map(|v| v as u32))
}

impl SqliteStore {
    async fn fetch_latest(&self, path: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOC_COLUMNS} FROM documents WHERE path = ? AND is_latest = 1"
        ))
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(doc_from_row).transpose()
    }

    async fn install(&self, new: NewVersion) -> Result<AppendOutcome> {
        let doc = &new.document;
        let tags_json = serde_json::to_string(&doc.tags)?;
        let headings_json = serde_json::to_string(&doc.headings)?;

        let mut tx = self.pool.begin().await?;

        // The first statement writes, taking SQLite's write lock.
        if let Some(expected) = new.expected_latest {
            let flipped = sqlx::query(
                "UPDATE documents SET is_latest = 0 WHERE path = ? AND is_latest = 1 AND version = ?",
            )
            .bind(&doc.path)
            .bind(i64::from(expected))
            .execute(&mut *tx)
            .await?;
            if flipped.rows_affected() != 1 {
                tx.rollback().await?;
                let current = current_latest(&self.pool, &doc.path).await?;
                return Ok(AppendOutcome::Conflict { current });
            }
        }

        // A first version only lands if no row exists for the path yet.
        let guard = if new.expected_latest.is_none() {
            "WHERE NOT EXISTS (SELECT 1 FROM documents WHERE path = ?)"
        } else {
            ""
        };
        let sql = format!(
            r#"
            INSERT INTO documents (id, path, filename, extension, size, modified_at, title,
                                   tags_json, headings_json, content_excerpt, content_hash,
                                   indexed_at, version, is_latest, project_id)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?
            {guard}
            "#
        );
        let mut insert = sqlx::query(&sql)
            .bind(&doc.id)
            .bind(&doc.path)
            .bind(&doc.filename)
            .bind(&doc.extension)
            .bind(doc.size as i64)
            .bind(doc.modified_at)
            .bind(&doc.title)
            .bind(&tags_json)
            .bind(&headings_json)
            .bind(&doc.content_excerpt)
            .bind(&doc.content_hash)
            .bind(doc.indexed_at)
            .bind(i64::from(doc.version))
            .bind(&doc.project_id);
        if new.expected_latest.is_none() {
            insert = insert.bind(&doc.path);
        }
        let inserted = match insert.execute(&mut *tx).await {
            Ok(res) => res.rows_affected(),
            Err(e) if is_unique_violation(&e) => 0,
            Err(e) => return Err(e.into()),
        };
        if inserted != 1 {
            tx.rollback().await?;
            let current = current_latest(&self.pool, &doc.path).await?;
            return Ok(AppendOutcome::Conflict { current });
        }

        sqlx::query("INSERT INTO contents (document_id, text) VALUES (?, ?)")
            .bind(&doc.id)
            .bind(&new.content)
            .execute(&mut *tx)
            .await?;

        for chunk in &new.chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, text, start_offset, end_offset, hash) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(i64::from(chunk.chunk_index))
            .bind(&chunk.text)
            .bind(chunk.start_offset as i64)
            .bind(chunk.end_offset as i64)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;
        }

        for posting in postings_for(doc, &new.chunks) {
            sqlx::query(
                "INSERT INTO postings (term, document_id, chunk_id, positions) VALUES (?, ?, ?, ?)",
            )
            .bind(&posting.term)
            .bind(&doc.id)
            .bind(&posting.chunk_id)
            .bind(serde_json::to_string(&posting.positions)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(AppendOutcome::Appended)
    }

    async fn fetch_versions(&self, path: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOC_COLUMNS} FROM documents WHERE path = ? ORDER BY version DESC"
        ))
        .bind(path)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(doc_from_row).collect()
    }

    async fn fetch_version(&self, path: &str, version: u32) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOC_COLUMNS} FROM documents WHERE path = ? AND version = ?"
        ))
        .bind(path)
        .bind(i64::from(version))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(doc_from_row).transpose()
    }

    async fn fetch_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!("SELECT {DOC_COLUMNS} FROM documents WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(doc_from_row).transpose()
    }

    async fn fetch_content(&self, document_id: &str) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar("SELECT text FROM contents WHERE document_id = ?")
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn fetch_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, text, start_offset, end_offset, hash FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn remove_path(&self, path: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let removed = delete_path_tx(&mut tx, path).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn latest_paths_under(&self, folder: &str, project_id: Option<&str>) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT path, project_id FROM documents WHERE is_latest = 1 ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        let mut paths = Vec::new();
        for row in rows {
            let path: String = row.try_get("path")?;
            let owner: Option<String> = row.try_get("project_id")?;
            if !under_folder(&path, folder) {
                continue;
            }
            if project_id.is_some() && owner.as_deref() != project_id {
                continue;
            }
            paths.push(path);
        }
        Ok(paths)
    }

    async fn version_table(&self) -> Result<Vec<VersionInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.path, d.version, d.is_latest, d.indexed_at,
                   COALESCE(LENGTH(CAST(c.text AS BLOB)), 0) AS content_bytes
            FROM documents d
            LEFT JOIN contents c ON c.document_id = d.id
            ORDER BY d.path ASC, d.version ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let version: i64 = row.try_get("version")?;
                let is_latest: i64 = row.try_get("is_latest")?;
                let bytes: i64 = row.try_get("content_bytes")?;
                Ok(VersionInfo {
                    document_id: row.try_get("id")?,
                    path: row.try_get("path")?,
                    version: version as u32,
                    is_latest: is_latest != 0,
                    indexed_at: row.try_get("indexed_at")?,
                    content_bytes: bytes.max(0) as u64,
                })
            })
            .collect()
    }

    async fn purge_rows(&self, document_ids: &[String]) -> Result<PurgeStats> {
        let mut tx = self.pool.begin().await?;
        let mut stats = PurgeStats::default();
        for id in document_ids {
            let row = sqlx::query(
                r#"
                SELECT d.is_latest, COALESCE(LENGTH(CAST(c.text AS BLOB)), 0) AS content_bytes
                FROM documents d
                LEFT JOIN contents c ON c.document_id = d.id
                WHERE d.id = ?
                "#,
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(row) = row else { continue };
            let is_latest: i64 = row.try_get("is_latest")?;
            if is_latest != 0 {
                continue;
            }
            let bytes: i64 = row.try_get("content_bytes")?;
            if delete_version_tx(&mut tx, id).await? > 0 {
                stats.versions_deleted += 1;
                stats.space_freed_bytes += bytes.max(0) as u64;
            }
        }
        tx.commit().await?;
        Ok(stats)
    }

    async fn candidates(&self, terms: &[String], include_historical: bool) -> Result<Vec<Candidate>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        // One read transaction keeps documents and chunks on the same snapshot.
        let mut tx = self.pool.begin().await?;

        let latest_clause = if include_historical {
            ""
        } else {
            " AND is_latest = 1"
        };
        let sql = format!(
            "SELECT {DOC_COLUMNS} FROM documents WHERE id IN \
             (SELECT DISTINCT document_id FROM postings WHERE term IN ({})){latest_clause}",
            placeholders(terms.len())
        );
        let mut query = sqlx::query(&sql);
        for term in terms {
            query = query.bind(term);
        }
        let rows = query.fetch_all(&mut *tx).await?;
        let docs: Vec<Document> = rows.iter().map(doc_from_row).collect::<Result<_>>()?;

        let mut out = Vec::with_capacity(docs.len());
        for document in docs {
            let rows = sqlx::query(
                "SELECT id, document_id, chunk_index, text, start_offset, end_offset, hash FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
            )
            .bind(&document.id)
            .fetch_all(&mut *tx)
            .await?;
            let chunks = rows.iter().map(chunk_from_row).collect::<Result<_>>()?;
            out.push(Candidate { document, chunks });
        }
        tx.commit().await?;
        Ok(out)
    }

    async fn latest_page(
        &self,
        project_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Document>, usize)> {
        let filter = if project_id.is_some() {
            " AND project_id = ?"
        } else {
            ""
        };
        let count_sql = format!("SELECT COUNT(*) FROM documents WHERE is_latest = 1{filter}");
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(pid) = project_id {
            count = count.bind(pid);
        }
        let total = count.fetch_one(&self.pool).await?;

        let sql = format!(
            "SELECT {DOC_COLUMNS} FROM documents WHERE is_latest = 1{filter} \
             ORDER BY modified_at DESC, path ASC LIMIT ? OFFSET ?"
        );
        let mut query = sqlx::query(&sql);
        if let Some(pid) = project_id {
            query = query.bind(pid);
        }
        let rows = query
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        let docs = rows.iter().map(doc_from_row).collect::<Result<_>>()?;
        Ok((docs, total.max(0) as usize))
    }

    async fn load_policy(&self) -> Result<RetentionPolicy> {
        let row = sqlx::query("SELECT kind, value, description FROM retention_policy WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(RetentionPolicy::default());
        };
        let kind: String = row.try_get("kind")?;
        let value: i64 = row.try_get("value")?;
        Ok(RetentionPolicy {
            kind: RetentionKind::parse(&kind)
                .with_context(|| format!("unknown stored retention policy '{kind}'"))?,
            value: value.max(0) as u32,
            description: row.try_get("description")?,
        })
    }

    async fn store_policy(&self, policy: &RetentionPolicy) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO retention_policy (id, kind, value, description)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                value = excluded.value,
                description = excluded.description
            "#,
        )
        .bind(policy.kind.as_str())
        .bind(i64::from(policy.value))
        .bind(&policy.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_project(&self, project: &Project) -> Result<bool> {
        let res = sqlx::query(
            "INSERT INTO projects (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await;
        match res {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_project(&self, id: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT id, name, description, created_at, updated_at FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn fetch_projects(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query(
            "SELECT id, name, description, created_at, updated_at FROM projects ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(project_from_row).collect()
    }

    async fn remove_project(&self, id: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn references(&self, id: &str) -> Result<ProjectReferences> {
        let documents: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT path) FROM documents WHERE project_id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        let folders: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM indexed_folders WHERE project_id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(ProjectReferences {
            documents: documents.max(0) as usize,
            folders: folders.max(0) as usize,
        })
    }

    async fn save_folder(&self, folder: &IndexedFolder) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO indexed_folders (path, project_id, file_count, last_indexed)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                project_id = excluded.project_id,
                file_count = excluded.file_count,
                last_indexed = excluded.last_indexed
            "#,
        )
        .bind(&folder.path)
        .bind(&folder.project_id)
        .bind(i64::from(folder.file_count))
        .bind(folder.last_indexed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_folder(&self, path: &str) -> Result<Option<IndexedFolder>> {
        let row = sqlx::query(
            "SELECT path, project_id, file_count, last_indexed FROM indexed_folders WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(folder_from_row).transpose()
    }

    async fn fetch_folders(&self) -> Result<Vec<IndexedFolder>> {
        let rows = sqlx::query(
            "SELECT path, project_id, file_count, last_indexed FROM indexed_folders ORDER BY path",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(folder_from_row).collect()
    }

    /// `None` when the folder is not registered.
    async fn reassign_folder(&self, path: &str, project_id: Option<&str>) -> Result<Option<usize>> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE indexed_folders SET project_id = ? WHERE path = ?")
            .bind(project_id)
            .bind(path)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let paths: Vec<String> = sqlx::query_scalar("SELECT DISTINCT path FROM documents")
            .fetch_all(&mut *tx)
            .await?;
        let mut restamped = 0;
        for doc_path in paths.iter().filter(|p| under_folder(p, path)) {
            let res = sqlx::query("UPDATE documents SET project_id = ? WHERE path = ?")
                .bind(project_id)
                .bind(doc_path)
                .execute(&mut *tx)
                .await?;
            restamped += res.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(Some(restamped))
    }

    /// `None` when the folder is not registered.
    async fn drop_folder(&self, path: &str) -> Result<Option<usize>> {
        let mut tx = self.pool.begin().await?;
        let owner: Option<Option<String>> =
            sqlx::query_scalar("SELECT project_id FROM indexed_folders WHERE path = ?")
                .bind(path)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(owner) = owner else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("DELETE FROM indexed_folders WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query("SELECT path, project_id FROM documents WHERE is_latest = 1")
            .fetch_all(&mut *tx)
            .await?;
        let mut doomed = Vec::new();
        for row in rows {
            let doc_path: String = row.try_get("path")?;
            let doc_owner: Option<String> = row.try_get("project_id")?;
            if under_folder(&doc_path, path) && doc_owner == owner {
                doomed.push(doc_path);
            }
        }
        for doc_path in &doomed {
            delete_path_tx(&mut tx, doc_path).await?;
        }
        tx.commit().await?;
        Ok(Some(doomed.len()))
    }
}

fn folder_not_found(path: &str) -> LedgerError {
    LedgerError::not_found(
        format!("folder {path}"),
        "list folders to see registered roots",
    )
}

#[async_trait]
impl Store for SqliteStore {
    async fn latest_version(&self, path: &str) -> docledger_core::Result<Option<Document>> {
        Ok(self.fetch_latest(path).await?)
    }

    async fn append_version(&self, new: NewVersion) -> docledger_core::Result<AppendOutcome> {
        Ok(self.install(new).await?)
    }

    async fn list_versions(&self, path: &str) -> docledger_core::Result<Vec<Document>> {
        Ok(self.fetch_versions(path).await?)
    }

    async fn get_version(&self, path: &str, version: u32) -> docledger_core::Result<Option<Document>> {
        Ok(self.fetch_version(path, version).await?)
    }

    async fn get_document(&self, id: &str) -> docledger_core::Result<Option<Document>> {
        Ok(self.fetch_document(id).await?)
    }

    async fn get_content(&self, document_id: &str) -> docledger_core::Result<Option<String>> {
        Ok(self.fetch_content(document_id).await?)
    }

    async fn get_chunks(&self, document_id: &str) -> docledger_core::Result<Vec<Chunk>> {
        Ok(self.fetch_chunks(document_id).await?)
    }

    async fn delete_path(&self, path: &str) -> docledger_core::Result<usize> {
        Ok(self.remove_path(path).await?)
    }

    async fn paths_under(
        &self,
        folder: &str,
        project_id: Option<&str>,
    ) -> docledger_core::Result<Vec<String>> {
        Ok(self.latest_paths_under(folder, project_id).await?)
    }

    async fn all_versions(&self) -> docledger_core::Result<Vec<VersionInfo>> {
        Ok(self.version_table().await?)
    }

    async fn delete_versions(&self, document_ids: &[String]) -> docledger_core::Result<PurgeStats> {
        Ok(self.purge_rows(document_ids).await?)
    }

    async fn search_candidates(
        &self,
        terms: &[String],
        include_historical: bool,
    ) -> docledger_core::Result<Vec<Candidate>> {
        Ok(self.candidates(terms, include_historical).await?)
    }

    async fn list_latest(
        &self,
        project_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> docledger_core::Result<(Vec<Document>, usize)> {
        Ok(self.latest_page(project_id, limit, offset).await?)
    }

    async fn retention_policy(&self) -> docledger_core::Result<RetentionPolicy> {
        Ok(self.load_policy().await?)
    }

    async fn set_retention_policy(&self, policy: &RetentionPolicy) -> docledger_core::Result<()> {
        Ok(self.store_policy(policy).await?)
    }

    async fn create_project(&self, project: &Project) -> docledger_core::Result<()> {
        if !self.insert_project(project).await? {
            return Err(LedgerError::invalid(format!(
                "project '{}' already exists",
                project.id
            )));
        }
        Ok(())
    }

    async fn get_project(&self, id: &str) -> docledger_core::Result<Option<Project>> {
        Ok(self.fetch_project(id).await?)
    }

    async fn list_projects(&self) -> docledger_core::Result<Vec<Project>> {
        Ok(self.fetch_projects().await?)
    }

    async fn delete_project(&self, id: &str) -> docledger_core::Result<bool> {
        Ok(self.remove_project(id).await?)
    }

    async fn project_references(&self, id: &str) -> docledger_core::Result<ProjectReferences> {
        Ok(self.references(id).await?)
    }

    async fn upsert_folder(&self, folder: &IndexedFolder) -> docledger_core::Result<()> {
        Ok(self.save_folder(folder).await?)
    }

    async fn get_folder(&self, path: &str) -> docledger_core::Result<Option<IndexedFolder>> {
        Ok(self.fetch_folder(path).await?)
    }

    async fn list_folders(&self) -> docledger_core::Result<Vec<IndexedFolder>> {
        Ok(self.fetch_folders().await?)
    }

    async fn assign_folder(
        &self,
        path: &str,
        project_id: Option<&str>,
    ) -> docledger_core::Result<usize> {
        self.reassign_folder(path, project_id)
            .await?
            .ok_or_else(|| folder_not_found(path))
    }

    async fn remove_folder(&self, path: &str) -> docledger_core::Result<usize> {
        self.drop_folder(path)
            .await?
            .ok_or_else(|| folder_not_found(path))
    }
}
