//! Tool trait and the built-in tools.
//!
//! Every collaborator-facing contract is a [`Tool`]: a name, a JSON schema
//! for its parameters, and an async `execute` taking JSON parameters. The
//! HTTP server dispatches `POST /tools/{name}` through a [`ToolRegistry`].
//!
//! Tool errors are `anyhow::Error`s wrapping a
//! [`LedgerError`]; the server downcasts them to pick the status code.
//!
//! ```rust
//! use docledger::tools::ToolRegistry;
//!
//! let tools = ToolRegistry::with_builtins();
//! assert!(tools.find("search_notes").is_some());
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use docledger_core::models::Citation;
use docledger_core::search::SearchRequest;
use docledger_core::LedgerError;

use crate::engine::Ledger;
use crate::ingest::{self, IndexOptions};
use crate::progress::NoProgress;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the parameters object.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Shared state handed to every tool call.
pub struct ToolContext {
    ledger: Arc<Ledger>,
    index_options: IndexOptions,
}

impl ToolContext {
    pub fn new(ledger: Arc<Ledger>, index_options: IndexOptions) -> Self {
        Self {
            ledger,
            index_options,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

/// Serializable description of a tool for `GET /tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn parse_params<T: DeserializeOwned>(tool: &str, params: Value) -> Result<T> {
    // A missing body means "no parameters".
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params)
        .map_err(|e| LedgerError::invalid(format!("{tool}: bad parameters: {e}")).into())
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

// ── search_notes ────────────────────────────────────────────────────────

pub struct SearchNotesTool;

#[async_trait]
impl Tool for SearchNotesTool {
    fn name(&self) -> &str {
        "search_notes"
    }

    fn description(&self) -> &str {
        "Keyword search with filters, history and pagination"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Terms, \"quoted phrases\", OR" },
                "filters": {
                    "type": "object",
                    "properties": {
                        "file_types": { "type": "array", "items": { "type": "string" } },
                        "folders": { "type": "array", "items": { "type": "string" } },
                        "tags": { "type": "array", "items": { "type": "string" } },
                        "modified_from": { "type": "integer" },
                        "modified_to": { "type": "integer" },
                        "project_ids": { "type": "array", "items": { "type": "string" } }
                    }
                },
                "include_historical": { "type": "boolean", "default": false },
                "sort": { "type": "string", "enum": ["relevance", "modified"], "default": "relevance" },
                "limit": { "type": "integer" },
                "offset": { "type": "integer", "default": 0 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let request: SearchRequest = parse_params(self.name(), params)?;
        to_value(&ctx.ledger.search(&request).await?)
    }
}

// ── read_note ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ReadNoteParams {
    #[serde(alias = "path")]
    id: String,
    #[serde(default)]
    version: Option<u32>,
}

pub struct ReadNoteTool;

#[async_trait]
impl Tool for ReadNoteTool {
    fn name(&self) -> &str {
        "read_note"
    }

    fn description(&self) -> &str {
        "Read a document by id or path, optionally at a given version"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "Document id or path" },
                "version": { "type": "integer", "minimum": 1 }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: ReadNoteParams = parse_params(self.name(), params)?;
        to_value(&ctx.ledger.read_note(&p.id, p.version).await?)
    }
}

// ── answer_question ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct AnswerParams {
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default, alias = "project_id")]
    project_filter: Option<String>,
}

pub struct AnswerQuestionTool;

#[async_trait]
impl Tool for AnswerQuestionTool {
    fn name(&self) -> &str {
        "answer_question"
    }

    fn description(&self) -> &str {
        "Retrieve grounding chunks and citations for a question"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "top_k": { "type": "integer", "minimum": 1 },
                "project_filter": { "type": "string" }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: AnswerParams = parse_params(self.name(), params)?;
        let response = ctx
            .ledger
            .answer_question(&p.question, p.top_k, p.project_filter.as_deref())
            .await?;
        to_value(&response)
    }
}

// ── resolve_citations ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct ResolveParams {
    citations: Vec<Citation>,
}

pub struct ResolveCitationsTool;

#[async_trait]
impl Tool for ResolveCitationsTool {
    fn name(&self) -> &str {
        "resolve_citations"
    }

    fn description(&self) -> &str {
        "Re-annotate earlier citations with the current latest versions"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "citations": { "type": "array", "items": { "type": "object" } }
            },
            "required": ["citations"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: ResolveParams = parse_params(self.name(), params)?;
        let citations = ctx.ledger.resolve_citations(&p.citations).await?;
        Ok(serde_json::json!({ "citations": citations }))
    }
}

// ── get_document_versions ───────────────────────────────────────────────

#[derive(Deserialize)]
struct PathParams {
    path: String,
}

pub struct GetDocumentVersionsTool;

#[async_trait]
impl Tool for GetDocumentVersionsTool {
    fn name(&self) -> &str {
        "get_document_versions"
    }

    fn description(&self) -> &str {
        "List every version of a path, newest first"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: PathParams = parse_params(self.name(), params)?;
        let versions = ctx.ledger.get_document_versions(&p.path).await?;
        Ok(serde_json::json!({ "path": p.path, "versions": versions }))
    }
}

// ── compare_versions ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CompareParams {
    path: String,
    version_a: u32,
    version_b: u32,
}

pub struct CompareVersionsTool;

#[async_trait]
impl Tool for CompareVersionsTool {
    fn name(&self) -> &str {
        "compare_versions"
    }

    fn description(&self) -> &str {
        "Line diff between two versions of a path"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "version_a": { "type": "integer", "minimum": 1 },
                "version_b": { "type": "integer", "minimum": 1 }
            },
            "required": ["path", "version_a", "version_b"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: CompareParams = parse_params(self.name(), params)?;
        let diff = ctx
            .ledger
            .compare_versions(&p.path, p.version_a, p.version_b)
            .await?;
        to_value(&diff)
    }
}

// ── retention ───────────────────────────────────────────────────────────

pub struct GetRetentionPolicyTool;

#[async_trait]
impl Tool for GetRetentionPolicyTool {
    fn name(&self) -> &str {
        "get_retention_policy"
    }

    fn description(&self) -> &str {
        "Show the history retention policy"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        to_value(&ctx.ledger.get_retention_policy().await?)
    }
}

#[derive(Deserialize)]
struct SetPolicyParams {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: Option<u32>,
}

pub struct SetRetentionPolicyTool;

#[async_trait]
impl Tool for SetRetentionPolicyTool {
    fn name(&self) -> &str {
        "set_retention_policy"
    }

    fn description(&self) -> &str {
        "Change the history retention policy (does not purge)"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "type": { "type": "string", "enum": ["all", "last_n_versions", "last_n_days"] },
                "value": { "type": "integer", "minimum": 1 }
            },
            "required": ["type"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: SetPolicyParams = parse_params(self.name(), params)?;
        to_value(&ctx.ledger.set_retention_policy(&p.kind, p.value).await?)
    }
}

#[derive(Deserialize)]
struct PurgeParams {
    #[serde(default)]
    dry_run: bool,
}

pub struct PurgeHistoryTool;

#[async_trait]
impl Tool for PurgeHistoryTool {
    fn name(&self) -> &str {
        "purge_history"
    }

    fn description(&self) -> &str {
        "Delete historical versions the retention policy no longer keeps"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "dry_run": { "type": "boolean", "default": false } }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: PurgeParams = parse_params(self.name(), params)?;
        to_value(&ctx.ledger.purge_history(p.dry_run).await?)
    }
}

// ── index ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct IndexParams {
    folders: Vec<String>,
    #[serde(default)]
    project_id: Option<String>,
}

pub struct IndexTool;

#[async_trait]
impl Tool for IndexTool {
    fn name(&self) -> &str {
        "index"
    }

    fn description(&self) -> &str {
        "Index or re-index folders"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "folders": { "type": "array", "items": { "type": "string" } },
                "project_id": { "type": "string" }
            },
            "required": ["folders"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: IndexParams = parse_params(self.name(), params)?;
        let folders: Vec<PathBuf> = p.folders.iter().map(PathBuf::from).collect();
        let result = ingest::index(
            &ctx.ledger,
            &folders,
            p.project_id.as_deref(),
            &ctx.index_options,
            &CancellationToken::new(),
            &NoProgress,
        )
        .await?;
        to_value(&result)
    }
}

// ── list_notes ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

pub struct ListNotesTool;

#[async_trait]
impl Tool for ListNotesTool {
    fn name(&self) -> &str {
        "list_notes"
    }

    fn description(&self) -> &str {
        "Latest documents, most recently modified first"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "project_id": { "type": "string" },
                "limit": { "type": "integer", "minimum": 1 },
                "offset": { "type": "integer", "default": 0 }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let p: ListParams = parse_params(self.name(), params)?;
        let list = ctx
            .ledger
            .list_notes(p.project_id.as_deref(), p.limit, p.offset)
            .await?;
        to_value(&list)
    }
}

// ── registry ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchNotesTool));
        registry.register(Box::new(ReadNoteTool));
        registry.register(Box::new(AnswerQuestionTool));
        registry.register(Box::new(ResolveCitationsTool));
        registry.register(Box::new(GetDocumentVersionsTool));
        registry.register(Box::new(CompareVersionsTool));
        registry.register(Box::new(GetRetentionPolicyTool));
        registry.register(Box::new(SetRetentionPolicyTool));
        registry.register(Box::new(PurgeHistoryTool));
        registry.register(Box::new(IndexTool));
        registry.register(Box::new(ListNotesTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LedgerSettings;
    use docledger_core::store::memory::InMemoryStore;

    fn ctx() -> ToolContext {
        let ledger = Ledger::new(Arc::new(InMemoryStore::new()), LedgerSettings::default());
        ToolContext::new(Arc::new(ledger), IndexOptions::default())
    }

    fn code(err: &anyhow::Error) -> &'static str {
        err.downcast_ref::<LedgerError>()
            .map(|e| e.code())
            .unwrap_or("?")
    }

    #[test]
    fn builtins_have_unique_names() {
        let registry = ToolRegistry::with_builtins();
        let mut names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), registry.len());
        assert_eq!(registry.len(), 11);
    }

    #[tokio::test]
    async fn malformed_params_are_invalid_input() {
        let ctx = ctx();
        let err = CompareVersionsTool
            .execute(serde_json::json!({ "path": "a.md", "version_a": "one" }), &ctx)
            .await
            .unwrap_err();
        assert_eq!(code(&err), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn engine_errors_keep_their_code() {
        let ctx = ctx();
        let err = GetDocumentVersionsTool
            .execute(serde_json::json!({ "path": "missing.md" }), &ctx)
            .await
            .unwrap_err();
        assert_eq!(code(&err), "NOT_FOUND");

        let err = SearchNotesTool
            .execute(serde_json::json!({ "query": "x", "limit": 1000 }), &ctx)
            .await
            .unwrap_err();
        assert_eq!(code(&err), "LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn search_and_read_round_through_tools() {
        let ctx = ctx();
        ctx.ledger()
            .ingest_bytes("notes/docker.md", b"# Docker\nUse volumes for persistence.", 1, None)
            .await
            .unwrap();

        let found = SearchNotesTool
            .execute(serde_json::json!({ "query": "volumes" }), &ctx)
            .await
            .unwrap();
        assert_eq!(found["total"], 1);
        assert_eq!(found["results"][0]["version"], 1);

        let note = ReadNoteTool
            .execute(serde_json::json!({ "path": "notes/docker.md" }), &ctx)
            .await
            .unwrap();
        assert_eq!(note["latest_version"], 1);
    }
}
