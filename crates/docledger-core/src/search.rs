//! Search Index: query evaluation, filtering, ranking, snippets and
//! pagination over the store's inverted index.
//!
//! # Pipeline
//!
//! ```text
//! request ─▶ validate limit/filters ─▶ parse query ─▶ store candidates
//!        ─▶ filter ─▶ evaluate groups ─▶ score ─▶ sort ─▶ page ─▶ snippets
//! ```
//!
//! # Scoring
//!
//! Relevance is the sum over chunks of matched-token occurrences divided by
//! the chunk's token count, plus [`METADATA_BONUS`] for every distinct query
//! term found in the title or filename. Ties break on modified-at (newest
//! first), then path, then version (newest first).

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::chunk::{back_chars, forward_chars, tokenize, Token};
use crate::error::{LedgerError, Result};
use crate::models::{Chunk, Document};
use crate::query::{self, Clause, ParsedQuery};
use crate::store::{under_folder, Candidate, Store};

/// Relevance added per distinct query term found in title or filename.
pub const METADATA_BONUS: f64 = 0.5;

const MAX_SNIPPETS: usize = 2;

/// Filters combine conjunctively; values inside one filter are any-of.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Inclusive lower bound on modified-at (Unix seconds).
    #[serde(default)]
    pub modified_from: Option<i64>,
    /// Inclusive upper bound on modified-at (Unix seconds).
    #[serde(default)]
    pub modified_to: Option<i64>,
    #[serde(default)]
    pub project_ids: Vec<String>,
}

impl SearchFilters {
    pub fn validate(&self) -> Result<()> {
        let lists = [
            ("file_types", &self.file_types),
            ("folders", &self.folders),
            ("tags", &self.tags),
            ("project_ids", &self.project_ids),
        ];
        for (name, values) in lists {
            if values.iter().any(|v| v.trim().is_empty()) {
                return Err(LedgerError::invalid(format!(
                    "filter '{name}' contains an empty value"
                )));
            }
        }
        if let (Some(from), Some(to)) = (self.modified_from, self.modified_to) {
            if from > to {
                return Err(LedgerError::invalid(
                    "modified_from must not be later than modified_to",
                ));
            }
        }
        Ok(())
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if !self.file_types.is_empty()
            && !self
                .file_types
                .iter()
                .any(|t| t.trim_start_matches('.').eq_ignore_ascii_case(&doc.extension))
        {
            return false;
        }
        if !self.folders.is_empty() && !self.folders.iter().any(|f| under_folder(&doc.path, f)) {
            return false;
        }
        if !self.tags.is_empty()
            && !self
                .tags
                .iter()
                .any(|t| doc.tags.iter().any(|dt| dt.eq_ignore_ascii_case(t)))
        {
            return false;
        }
        if self.modified_from.is_some_and(|from| doc.modified_at < from) {
            return false;
        }
        if self.modified_to.is_some_and(|to| doc.modified_at > to) {
            return false;
        }
        if !self.project_ids.is_empty()
            && !doc
                .project_id
                .as_ref()
                .is_some_and(|pid| self.project_ids.contains(pid))
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Relevance,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    pub default_limit: usize,
    pub max_page_size: usize,
    pub snippet_window_chars: usize,
    pub snippet_lead_chars: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_page_size: 100,
            snippet_window_chars: 240,
            snippet_lead_chars: 80,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub include_historical: bool,
    #[serde(default)]
    pub sort: SortMode,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

/// Byte range inside [`Snippet::text`] to highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snippet {
    pub chunk_id: String,
    pub text: String,
    /// Byte offsets of `text` in the version's content.
    pub start_offset: usize,
    pub end_offset: usize,
    pub highlights: Vec<Highlight>,
    /// `text` with every highlight wrapped in `**`.
    pub highlighted: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document: Document,
    pub version: u32,
    pub is_latest: bool,
    pub score: f64,
    pub snippets: Vec<Snippet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    /// Matches before pagination.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Apply the default and enforce `1..=max_page_size`.
pub fn resolve_limit(limit: Option<usize>, settings: &SearchSettings) -> Result<usize> {
    let limit = limit.unwrap_or(settings.default_limit);
    if limit == 0 {
        return Err(LedgerError::invalid("limit must be at least 1"));
    }
    if limit > settings.max_page_size {
        return Err(LedgerError::LimitExceeded {
            requested: limit,
            max: settings.max_page_size,
        });
    }
    Ok(limit)
}

// ---------- evaluation ----------

/// Per-chunk match details.
#[derive(Debug, Clone)]
pub(crate) struct ChunkAnalysis {
    pub position: usize,
    pub tokens: Vec<Token>,
    /// Indices into `tokens` matched by some clause.
    pub matched: BTreeSet<usize>,
    /// Distinct query tokens present in the chunk.
    pub terms: BTreeSet<String>,
}

impl ChunkAnalysis {
    pub fn density(&self) -> f64 {
        if self.tokens.is_empty() {
            0.0
        } else {
            self.matched.len() as f64 / self.tokens.len() as f64
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DocAnalysis {
    pub matches: bool,
    pub chunks: Vec<ChunkAnalysis>,
    /// Distinct query tokens found in title or filename.
    pub metadata_terms: BTreeSet<String>,
}

/// Start indices of `phrase` inside `tokens`.
fn phrase_starts(tokens: &[String], phrase: &[String]) -> Vec<usize> {
    if phrase.is_empty() || tokens.len() < phrase.len() {
        return Vec::new();
    }
    (0..=tokens.len() - phrase.len())
        .filter(|&i| tokens[i..i + phrase.len()] == *phrase)
        .collect()
}

pub(crate) fn analyze(candidate: &Candidate, query: &ParsedQuery) -> DocAnalysis {
    let clauses: Vec<&Clause> = {
        let mut seen: Vec<&Clause> = Vec::new();
        for clause in query.groups.iter().flatten() {
            if !seen.contains(&clause) {
                seen.push(clause);
            }
        }
        seen
    };

    let title_tokens: Vec<String> = candidate
        .document
        .title
        .as_deref()
        .map(|t| tokenize(t).into_iter().map(|t| t.text).collect())
        .unwrap_or_default();
    let filename_tokens: Vec<String> = tokenize(&candidate.document.filename)
        .into_iter()
        .map(|t| t.text)
        .collect();

    // clause → satisfied anywhere in the version
    let mut satisfied: HashMap<&Clause, bool> = HashMap::new();
    let mut chunks = Vec::with_capacity(candidate.chunks.len());

    for (position, chunk) in candidate.chunks.iter().enumerate() {
        let tokens = tokenize(&chunk.text);
        let words: Vec<String> = tokens.iter().map(|t| t.text.clone()).collect();
        let mut matched = BTreeSet::new();
        let mut terms = BTreeSet::new();

        for clause in &clauses {
            let phrase = clause.tokens();
            let starts = phrase_starts(&words, phrase);
            if starts.is_empty() {
                continue;
            }
            satisfied.insert(*clause, true);
            for start in starts {
                matched.extend(start..start + phrase.len());
            }
            terms.extend(phrase.iter().cloned());
        }

        chunks.push(ChunkAnalysis {
            position,
            tokens,
            matched,
            terms,
        });
    }

    let mut metadata_terms = BTreeSet::new();
    for clause in &clauses {
        let in_title = !phrase_starts(&title_tokens, clause.tokens()).is_empty();
        let in_filename = match clause {
            Clause::Term(t) => filename_tokens.contains(t),
            Clause::Phrase(_) => false,
        };
        if in_title || in_filename {
            satisfied.insert(*clause, true);
            metadata_terms.extend(clause.tokens().iter().cloned());
        }
    }

    let matches = query.groups.iter().any(|group| {
        group
            .iter()
            .all(|c| satisfied.get(c).copied().unwrap_or(false))
    });

    DocAnalysis {
        matches,
        chunks,
        metadata_terms,
    }
}

fn relevance(analysis: &DocAnalysis) -> f64 {
    let chunk_score: f64 = analysis.chunks.iter().map(ChunkAnalysis::density).sum();
    chunk_score + METADATA_BONUS * analysis.metadata_terms.len() as f64
}

/// Newest modification first, then path, then newest version.
pub(crate) fn tie_break(a: &Document, b: &Document) -> Ordering {
    b.modified_at
        .cmp(&a.modified_at)
        .then_with(|| a.path.cmp(&b.path))
        .then_with(|| b.version.cmp(&a.version))
}

// ---------- snippets ----------

/// Coalesce matched token ranges separated only by non-alphanumerics.
fn merge_spans(text: &str, mut spans: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    spans.sort_unstable();
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in spans {
        if let Some(last) = merged.last_mut() {
            if start <= last.1 || !text[last.1..start].chars().any(char::is_alphanumeric) {
                last.1 = last.1.max(end);
                continue;
            }
        }
        merged.push((start, end));
    }
    merged
}

fn make_snippet(chunk: &Chunk, analysis: &ChunkAnalysis, settings: &SearchSettings) -> Option<Snippet> {
    let first = *analysis.matched.iter().next()?;
    let text = chunk.text.as_str();
    let anchor = analysis.tokens[first].start;

    let mut start = back_chars(text, anchor, settings.snippet_lead_chars);
    // Do not open mid-word.
    if start > 0 {
        if let Some(token) = analysis
            .tokens
            .iter()
            .find(|t| t.start < start && t.end > start)
        {
            start = analysis
                .tokens
                .iter()
                .find(|t| t.start >= token.end)
                .map(|t| t.start.min(anchor))
                .unwrap_or(anchor);
        }
    }
    let mut end = forward_chars(text, start, settings.snippet_window_chars.max(1));
    if end < text.len() {
        if let Some(token) = analysis.tokens.iter().find(|t| t.start < end && t.end > end) {
            if token.start > anchor {
                end = token.start;
            }
        }
    }
    let window = &text[start..end];
    let trimmed_lead = window.len() - window.trim_start().len();
    let (start, end) = (start + trimmed_lead, start + window.trim_end().len());

    let spans: Vec<(usize, usize)> = analysis
        .matched
        .iter()
        .map(|&i| &analysis.tokens[i])
        .filter(|t| t.start >= start && t.end <= end)
        .map(|t| (t.start, t.end))
        .collect();
    let spans = merge_spans(text, spans);

    let mut highlighted = String::new();
    let mut cursor = start;
    for &(s, e) in &spans {
        highlighted.push_str(&text[cursor..s]);
        highlighted.push_str("**");
        highlighted.push_str(&text[s..e]);
        highlighted.push_str("**");
        cursor = e;
    }
    highlighted.push_str(&text[cursor..end]);

    Some(Snippet {
        chunk_id: chunk.id.clone(),
        text: text[start..end].to_string(),
        start_offset: chunk.start_offset + start,
        end_offset: chunk.start_offset + end,
        highlights: spans
            .into_iter()
            .map(|(s, e)| Highlight {
                start: s - start,
                end: e - start,
            })
            .collect(),
        highlighted,
    })
}

/// Up to two snippets from the chunks with the densest matches.
pub(crate) fn snippets(
    candidate: &Candidate,
    analysis: &DocAnalysis,
    settings: &SearchSettings,
) -> Vec<Snippet> {
    let mut ranked: Vec<&ChunkAnalysis> = analysis
        .chunks
        .iter()
        .filter(|c| !c.matched.is_empty())
        .collect();
    ranked.sort_by(|a, b| {
        b.density()
            .total_cmp(&a.density())
            .then(a.position.cmp(&b.position))
    });
    ranked
        .into_iter()
        .take(MAX_SNIPPETS)
        .filter_map(|c| make_snippet(&candidate.chunks[c.position], c, settings))
        .collect()
}

/// Run a search against the store.
pub async fn search(
    store: &dyn Store,
    request: &SearchRequest,
    settings: &SearchSettings,
) -> Result<SearchResponse> {
    let limit = resolve_limit(request.limit, settings)?;
    request.filters.validate()?;
    let parsed = query::parse(&request.query)?;
    let terms = parsed.terms();

    let candidates = store
        .search_candidates(&terms, request.include_historical)
        .await?;
    let candidate_count = candidates.len();

    let mut scored: Vec<(Candidate, DocAnalysis, f64)> = candidates
        .into_iter()
        .filter(|c| request.include_historical || c.document.is_latest)
        .filter(|c| request.filters.matches(&c.document))
        .filter_map(|c| {
            let analysis = analyze(&c, &parsed);
            if !analysis.matches {
                return None;
            }
            let score = relevance(&analysis);
            Some((c, analysis, score))
        })
        .collect();

    match request.sort {
        SortMode::Relevance => scored.sort_by(|a, b| {
            b.2.total_cmp(&a.2)
                .then_with(|| tie_break(&a.0.document, &b.0.document))
        }),
        SortMode::Modified => scored.sort_by(|a, b| tie_break(&a.0.document, &b.0.document)),
    }

    let total = scored.len();
    let results: Vec<SearchHit> = scored
        .into_iter()
        .skip(request.offset)
        .take(limit)
        .map(|(candidate, analysis, score)| {
            let snippets = snippets(&candidate, &analysis, settings);
            SearchHit {
                version: candidate.document.version,
                is_latest: candidate.document.is_latest,
                score,
                snippets,
                document: candidate.document,
            }
        })
        .collect();

    tracing::debug!(
        terms = terms.len(),
        candidates = candidate_count,
        total,
        returned = results.len(),
        "search complete"
    );

    Ok(SearchResponse {
        results,
        total,
        limit,
        offset: request.offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{prepare, ChunkingParams};
    use crate::store::memory::InMemoryStore;
    use crate::versions::{ingest, IngestInput};

    async fn put(store: &InMemoryStore, path: &str, text: &str, modified_at: i64) {
        let filename = path.rsplit('/').next().unwrap_or(path).to_string();
        let extension = filename.rsplit('.').next().unwrap_or("").to_string();
        let stem = filename.split('.').next().unwrap_or("").to_string();
        let prepared = prepare(text.as_bytes(), &extension, &stem, &ChunkingParams::default());
        let input = IngestInput {
            path: path.to_string(),
            filename,
            extension,
            size: text.len() as u64,
            modified_at,
            project_id: None,
        };
        ingest(store, &input, &prepared, 3, modified_at).await.unwrap();
    }

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn and_requires_every_term() {
        let store = InMemoryStore::new();
        put(&store, "a.md", "docker volumes persist data", 1).await;
        put(&store, "b.md", "docker networks", 2).await;

        let res = search(&store, &request("docker volumes"), &SearchSettings::default())
            .await
            .unwrap();
        assert_eq!(res.total, 1);
        assert_eq!(res.results[0].document.path, "a.md");
    }

    #[tokio::test]
    async fn or_matches_either_side() {
        let store = InMemoryStore::new();
        put(&store, "a.md", "docker volumes", 1).await;
        put(&store, "b.md", "kubernetes pods", 2).await;

        let res = search(&store, &request("volumes OR pods"), &SearchSettings::default())
            .await
            .unwrap();
        assert_eq!(res.total, 2);
    }

    #[tokio::test]
    async fn phrase_requires_contiguous_tokens() {
        let store = InMemoryStore::new();
        put(&store, "a.md", "use named volumes here", 1).await;
        put(&store, "b.md", "volumes named use", 2).await;

        let res = search(&store, &request("\"named volumes\""), &SearchSettings::default())
            .await
            .unwrap();
        assert_eq!(res.total, 1);
        assert_eq!(res.results[0].document.path, "a.md");
    }

    #[tokio::test]
    async fn matching_is_case_insensitive() {
        let store = InMemoryStore::new();
        put(&store, "a.md", "Docker Compose", 1).await;
        let res = search(&store, &request("DOCKER"), &SearchSettings::default())
            .await
            .unwrap();
        assert_eq!(res.total, 1);
    }

    #[tokio::test]
    async fn denser_chunk_ranks_first() {
        let store = InMemoryStore::new();
        put(&store, "dense.md", "rust rust rust", 1).await;
        put(&store, "sparse.md", "rust is one word among many other words here", 5).await;

        let res = search(&store, &request("rust"), &SearchSettings::default())
            .await
            .unwrap();
        assert_eq!(res.results[0].document.path, "dense.md");
    }

    #[tokio::test]
    async fn modified_sort_ignores_relevance() {
        let store = InMemoryStore::new();
        put(&store, "dense.md", "rust rust rust", 1).await;
        put(&store, "sparse.md", "rust is one word among many other words here", 5).await;

        let req = SearchRequest {
            sort: SortMode::Modified,
            ..request("rust")
        };
        let res = search(&store, &req, &SearchSettings::default()).await.unwrap();
        assert_eq!(res.results[0].document.path, "sparse.md");
    }

    #[tokio::test]
    async fn filename_match_makes_document_eligible() {
        let store = InMemoryStore::new();
        put(&store, "kubernetes.txt", "pods and services", 1).await;
        let res = search(&store, &request("kubernetes"), &SearchSettings::default())
            .await
            .unwrap();
        assert_eq!(res.total, 1);
        assert!(res.results[0].score >= METADATA_BONUS);
        assert!(res.results[0].snippets.is_empty());
    }

    #[tokio::test]
    async fn limit_bounds_are_enforced() {
        let store = InMemoryStore::new();
        let settings = SearchSettings::default();
        let zero = SearchRequest {
            limit: Some(0),
            ..request("x")
        };
        assert_eq!(
            search(&store, &zero, &settings).await.unwrap_err().code(),
            "INVALID_INPUT"
        );
        let huge = SearchRequest {
            limit: Some(settings.max_page_size + 1),
            ..request("x")
        };
        assert_eq!(
            search(&store, &huge, &settings).await.unwrap_err().code(),
            "LIMIT_EXCEEDED"
        );
    }

    #[tokio::test]
    async fn pagination_reports_total_before_paging() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            put(&store, &format!("n{i}.md"), "shared term", i).await;
        }
        let req = SearchRequest {
            limit: Some(2),
            offset: 2,
            ..request("shared")
        };
        let res = search(&store, &req, &SearchSettings::default()).await.unwrap();
        assert_eq!(res.total, 5);
        assert_eq!(res.results.len(), 2);
        // Equal scores fall back to newest modification first.
        assert_eq!(res.results[0].document.path, "n2.md");
    }

    #[tokio::test]
    async fn invalid_filters_are_rejected() {
        let store = InMemoryStore::new();
        let req = SearchRequest {
            filters: SearchFilters {
                modified_from: Some(10),
                modified_to: Some(5),
                ..Default::default()
            },
            ..request("x")
        };
        let err = search(&store, &req, &SearchSettings::default()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");

        let req = SearchRequest {
            filters: SearchFilters {
                tags: vec![" ".into()],
                ..Default::default()
            },
            ..request("x")
        };
        let err = search(&store, &req, &SearchSettings::default()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn filters_combine_conjunctively() {
        let store = InMemoryStore::new();
        put(&store, "notes/a.md", "---\ntags: [ops]\n---\ndocker", 10).await;
        put(&store, "notes/b.txt", "docker", 10).await;
        put(&store, "other/c.md", "---\ntags: [ops]\n---\ndocker", 10).await;

        let req = SearchRequest {
            filters: SearchFilters {
                file_types: vec!["md".into()],
                folders: vec!["notes".into()],
                tags: vec!["OPS".into()],
                ..Default::default()
            },
            ..request("docker")
        };
        let res = search(&store, &req, &SearchSettings::default()).await.unwrap();
        let paths: Vec<&str> = res.results.iter().map(|h| h.document.path.as_str()).collect();
        assert_eq!(paths, vec!["notes/a.md"]);
    }

    #[tokio::test]
    async fn snippet_highlights_coalesce_adjacent_matches() {
        let store = InMemoryStore::new();
        put(&store, "a.md", "Always use docker volumes for persistence.", 1).await;
        let res = search(&store, &request("docker volumes"), &SearchSettings::default())
            .await
            .unwrap();
        let snippet = &res.results[0].snippets[0];
        assert_eq!(snippet.highlights.len(), 1);
        assert_eq!(
            snippet.highlighted,
            "Always use **docker volumes** for persistence."
        );
    }

    #[tokio::test]
    async fn snippet_window_is_bounded() {
        let store = InMemoryStore::new();
        let filler = "lorem ipsum dolor sit amet ".repeat(20);
        let text = format!("{filler}needle {filler}");
        put(&store, "long.md", &text, 1).await;

        let settings = SearchSettings::default();
        let res = search(&store, &request("needle"), &settings).await.unwrap();
        let snippet = &res.results[0].snippets[0];
        assert!(snippet.text.chars().count() <= settings.snippet_window_chars);
        assert!(snippet.highlighted.contains("**needle**"));
        assert_eq!(
            &text[snippet.start_offset..snippet.end_offset],
            snippet.text.as_str()
        );
    }
}
