use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Create projects table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexed folders table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexed_folders (
            path TEXT PRIMARY KEY,
            project_id TEXT,
            file_count INTEGER NOT NULL DEFAULT 0,
            last_indexed INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per version
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            filename TEXT NOT NULL,
            extension TEXT NOT NULL,
            size INTEGER NOT NULL,
            modified_at INTEGER NOT NULL,
            title TEXT,
            tags_json TEXT NOT NULL DEFAULT '[]',
            headings_json TEXT NOT NULL DEFAULT '[]',
            content_excerpt TEXT NOT NULL DEFAULT '',
            content_hash TEXT NOT NULL,
            indexed_at INTEGER NOT NULL,
            version INTEGER NOT NULL CHECK (version >= 1),
            is_latest INTEGER NOT NULL DEFAULT 0,
            project_id TEXT,
            UNIQUE(path, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one latest row per path
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_latest ON documents(path) WHERE is_latest = 1",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contents (
            document_id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            hash TEXT NOT NULL,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Inverted index; chunk_id is NULL for title/filename tokens
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS postings (
            term TEXT NOT NULL,
            document_id TEXT NOT NULL,
            chunk_id TEXT,
            positions TEXT NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS retention_policy (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            kind TEXT NOT NULL,
            value INTEGER NOT NULL,
            description TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_path ON documents(path)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_modified_at ON documents(modified_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_postings_term ON postings(term)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_postings_document_id ON postings(document_id)")
        .execute(pool)
        .await?;

    Ok(())
}
