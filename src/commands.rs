//! CLI command implementations.
//!
//! Each `run_*` function opens the ledger, performs one operation and
//! prints the outcome to stdout: human-readable text by default, or pretty
//! JSON when `json` is set. Diagnostics go to stderr through `tracing`.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use docledger_core::diff::LineKind;
use docledger_core::models::format_ts_iso;
use docledger_core::search::{SearchFilters, SearchRequest, SortMode};

use crate::config::Config;
use crate::engine::Ledger;
use crate::ingest::{self, IndexOptions};
use crate::progress::ProgressMode;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// The key a path argument is stored under: the canonical path when it
/// exists on disk, otherwise the argument as given.
pub fn path_key(arg: &str) -> String {
    std::fs::canonicalize(arg)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| arg.to_string())
}

/// Parse `YYYY-MM-DD` into Unix seconds at the start (or end) of that day.
pub fn parse_date(s: &str, end_of_day: bool) -> Result<i64> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", s))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    let time = time.with_context(|| format!("invalid date '{}'", s))?;
    Ok(time.and_utc().timestamp())
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

pub async fn run_index(
    cfg: &Config,
    folders: &[PathBuf],
    project: Option<&str>,
    progress: ProgressMode,
    json: bool,
) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancelling: finishing files already in flight...");
            on_signal.cancel();
        }
    });

    let reporter = progress.reporter();
    let result = ingest::index(
        &ledger,
        folders,
        project,
        &IndexOptions::from_config(cfg),
        &cancel,
        reporter.as_ref(),
    )
    .await?;

    if json {
        return print_json(&result);
    }
    println!("index {}", if result.cancelled { "cancelled" } else { "complete" });
    println!("  folders: {}", result.folders);
    println!("  files processed: {}", result.files_processed);
    println!("  files skipped: {}", result.files_skipped);
    println!("  files failed: {}", result.files_failed);
    if result.files_cancelled > 0 {
        println!("  files cancelled: {}", result.files_cancelled);
    }
    for e in &result.errors {
        println!("  error: {}: {}", e.path, e.error);
    }
    Ok(())
}

pub async fn run_ingest(cfg: &Config, file: &Path, project: Option<&str>, json: bool) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let outcome = ledger.ingest_file(file, project).await?;
    if json {
        return print_json(&outcome);
    }
    if outcome.created_new_version {
        println!("{}: created version {}", file.display(), outcome.version);
    } else {
        println!("{}: unchanged (version {})", file.display(), outcome.version);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn run_search(
    cfg: &Config,
    query: &str,
    filters: SearchFilters,
    include_historical: bool,
    sort: SortMode,
    limit: Option<usize>,
    offset: usize,
    json: bool,
) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let request = SearchRequest {
        query: query.to_string(),
        filters,
        include_historical,
        sort,
        limit,
        offset,
    };
    let response = ledger.search(&request).await?;
    if json {
        return print_json(&response);
    }

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in response.results.iter().enumerate() {
        let freshness = if hit.is_latest { "" } else { ", historical" };
        println!(
            "{}. [{:.3}] {} (v{}{})",
            response.offset + i + 1,
            hit.score,
            hit.document.path,
            hit.version,
            freshness
        );
        if let Some(title) = &hit.document.title {
            println!("    title: {}", title);
        }
        for snippet in &hit.snippets {
            println!("    > {}", snippet.highlighted.replace('\n', " "));
        }
    }
    println!(
        "showing {}-{} of {}",
        response.offset + 1,
        response.offset + response.results.len(),
        response.total
    );
    Ok(())
}

pub async fn run_get(cfg: &Config, id: &str, version: Option<u32>, json: bool) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let key = path_key(id);
    let note = ledger.read_note(&key, version).await?;
    if json {
        return print_json(&note);
    }
    let doc = &note.document;
    println!("--- Document ---");
    println!("id:         {}", doc.id);
    println!("path:       {}", doc.path);
    println!("title:      {}", doc.title.as_deref().unwrap_or(""));
    println!("version:    {} (latest {})", doc.version, note.latest_version);
    println!("modified:   {}", format_ts_iso(doc.modified_at));
    println!("indexed:    {}", format_ts_iso(doc.indexed_at));
    println!("hash:       {}", short(&doc.content_hash));
    if !doc.tags.is_empty() {
        println!("tags:       {}", doc.tags.join(", "));
    }
    if let Some(project) = &doc.project_id {
        println!("project:    {}", project);
    }
    println!();
    println!("{}", note.content);
    Ok(())
}

pub async fn run_versions(cfg: &Config, path: &str, json: bool) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let key = path_key(path);
    let versions = ledger.get_document_versions(&key).await?;
    if json {
        return print_json(&versions);
    }
    println!("{}", key);
    for v in &versions {
        println!(
            "  v{:<4} {:<7} {}  {}  {} bytes",
            v.version,
            if v.is_latest { "latest" } else { "" },
            format_ts_iso(v.indexed_at),
            short(&v.content_hash),
            v.size
        );
    }
    Ok(())
}

pub async fn run_diff(cfg: &Config, path: &str, a: u32, b: u32, json: bool) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let key = path_key(path);
    let diff = ledger.compare_versions(&key, a, b).await?;
    if json {
        return print_json(&diff);
    }
    println!("--- {} v{}", diff.path, diff.version_a);
    println!("+++ {} v{}", diff.path, diff.version_b);
    for line in &diff.lines {
        let marker = match line.kind {
            LineKind::Added => '+',
            LineKind::Removed => '-',
            LineKind::Unchanged => ' ',
        };
        println!("{}{:>5} {}", marker, line.line_number, line.content);
    }
    println!(
        "{} added, {} removed, {} unchanged",
        diff.summary.added, diff.summary.removed, diff.summary.unchanged
    );
    Ok(())
}

pub async fn run_ask(
    cfg: &Config,
    question: &str,
    top_k: Option<usize>,
    project: Option<&str>,
    json: bool,
) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let response = ledger.answer_question(question, top_k, project).await?;
    if json {
        return print_json(&response);
    }
    println!("keywords:   {}", response.keywords.join(", "));
    println!("confidence: {:?}", response.confidence);
    if response.answer_context_chunks.is_empty() {
        println!("No supporting chunks found.");
        return Ok(());
    }
    for (i, (chunk, citation)) in response
        .answer_context_chunks
        .iter()
        .zip(&response.citations)
        .enumerate()
    {
        let stale = if citation.is_latest {
            String::new()
        } else {
            format!(" (latest is v{})", citation.latest_version)
        };
        println!();
        println!(
            "[{}] {} v{}{}  overlap {:.2}",
            i + 1,
            chunk.path,
            chunk.version,
            stale,
            chunk.overlap
        );
        println!("{}", chunk.text);
    }
    Ok(())
}

pub async fn run_retention_show(cfg: &Config, json: bool) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let policy = ledger.get_retention_policy().await?;
    if json {
        return print_json(&policy);
    }
    println!("type:        {}", policy.kind.as_str());
    println!("value:       {}", policy.value);
    println!("description: {}", policy.description);
    Ok(())
}

pub async fn run_retention_set(cfg: &Config, kind: &str, value: Option<u32>, json: bool) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let policy = ledger.set_retention_policy(kind, value).await?;
    if json {
        return print_json(&policy);
    }
    println!("Retention policy set: {}", policy.description);
    Ok(())
}

pub async fn run_purge(cfg: &Config, dry_run: bool, json: bool) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let report = ledger.purge_history(dry_run).await?;
    if json {
        return print_json(&report);
    }
    println!(
        "purge{} under policy: {}",
        if report.dry_run { " (dry run)" } else { "" },
        report.policy.description
    );
    for c in &report.candidates {
        println!("  {} v{}  {} bytes", c.path, c.version, c.content_bytes);
    }
    let verb = if report.dry_run { "would delete" } else { "deleted" };
    println!(
        "{} {} version(s), {} bytes",
        verb, report.versions_deleted, report.space_freed_bytes
    );
    Ok(())
}

pub async fn run_notes(
    cfg: &Config,
    project: Option<&str>,
    limit: Option<usize>,
    offset: usize,
    json: bool,
) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let list = ledger.list_notes(project, limit, offset).await?;
    if json {
        return print_json(&list);
    }
    for doc in &list.notes {
        println!(
            "{}  v{}  {}  {}",
            format_ts_iso(doc.modified_at),
            doc.version,
            doc.path,
            doc.title.as_deref().unwrap_or("")
        );
    }
    println!("{} of {} documents", list.notes.len(), list.total);
    Ok(())
}

pub async fn run_delete(cfg: &Config, path: &str, json: bool) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let key = path_key(path);
    let removed = ledger.delete_path(&key).await?;
    if json {
        return print_json(&serde_json::json!({ "path": key, "versions_deleted": removed }));
    }
    println!("Deleted {} version(s) of {}", removed, key);
    Ok(())
}

pub async fn run_projects_list(cfg: &Config, json: bool) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let projects = ledger.list_projects().await?;
    if json {
        return print_json(&projects);
    }
    if projects.is_empty() {
        println!("No projects.");
    }
    for p in &projects {
        println!(
            "{}  {}  {}",
            p.id,
            p.name,
            p.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub async fn run_projects_create(
    cfg: &Config,
    id: &str,
    name: &str,
    description: Option<&str>,
    json: bool,
) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let project = ledger.create_project(id, name, description).await?;
    if json {
        return print_json(&project);
    }
    println!("Created project {}", project.id);
    Ok(())
}

pub async fn run_projects_delete(cfg: &Config, id: &str, json: bool) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    ledger.delete_project(id).await?;
    if json {
        return print_json(&serde_json::json!({ "deleted": id }));
    }
    println!("Deleted project {}", id);
    Ok(())
}

pub async fn run_folders_list(cfg: &Config, json: bool) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let folders = ledger.list_folders().await?;
    if json {
        return print_json(&folders);
    }
    if folders.is_empty() {
        println!("No folders indexed.");
    }
    for f in &folders {
        println!(
            "{}  project={}  files={}  last_indexed={}",
            f.path,
            f.project_id.as_deref().unwrap_or("-"),
            f.file_count,
            f.last_indexed.map(format_ts_iso).unwrap_or_else(|| "never".to_string())
        );
    }
    Ok(())
}

pub async fn run_folders_assign(
    cfg: &Config,
    path: &str,
    project: Option<&str>,
    json: bool,
) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let key = path_key(path);
    let restamped = ledger.assign_folder(&key, project).await?;
    if json {
        return print_json(&serde_json::json!({
            "folder": key,
            "project_id": project,
            "versions_restamped": restamped
        }));
    }
    println!(
        "Assigned {} to {} ({} version(s) restamped)",
        key,
        project.unwrap_or("no project"),
        restamped
    );
    Ok(())
}

pub async fn run_folders_remove(cfg: &Config, path: &str, json: bool) -> Result<()> {
    let ledger = Ledger::open(cfg).await?;
    let key = path_key(path);
    let removed = ledger.remove_folder(&key).await?;
    if json {
        return print_json(&serde_json::json!({ "folder": key, "documents_removed": removed }));
    }
    println!("Removed folder {} and {} document(s)", key, removed);
    Ok(())
}
