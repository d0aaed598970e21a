//! Retrieval & Citation Resolver.
//!
//! Selects the top-k chunks for a question and annotates each with
//! citation metadata, including whether the cited version is still the
//! path's latest. Output is raw chunk text only: the answer-synthesis
//! collaborator may not claim anything beyond it.
//!
//! Matching reuses the search evaluator, but with every keyword as its own
//! alternative so that recall wins over precision.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chunk::tokenize;
use crate::error::{LedgerError, Result};
use crate::models::Citation;
use crate::query::{Clause, ParsedQuery};
use crate::search::{analyze, tie_break};
use crate::store::Store;

const EXCERPT_CHARS: usize = 200;

/// Weight of term frequency relative to keyword overlap.
const TF_WEIGHT: f64 = 0.1;

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "also", "and", "any", "are", "because",
    "been", "before", "being", "below", "between", "both", "but", "can", "could", "did", "does",
    "doing", "down", "during", "each", "few", "for", "from", "further", "had", "has", "have",
    "having", "her", "here", "hers", "him", "his", "how", "into", "its", "itself", "just", "more",
    "most", "not", "now", "off", "once", "only", "other", "our", "ours", "out", "over", "own",
    "same", "she", "should", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "then", "there", "these", "they", "this", "those", "through", "too", "under", "until", "very",
    "was", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
    "would", "you", "your", "yours",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalSettings {
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub weak_overlap: f64,
    pub strong_overlap: f64,
    pub medium_support: usize,
    pub high_support: usize,
    pub include_historical: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 20,
            weak_overlap: 0.25,
            strong_overlap: 0.5,
            medium_support: 2,
            high_support: 3,
            include_historical: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// One retrieved chunk, verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub path: String,
    pub title: Option<String>,
    pub version: u32,
    pub text: String,
    pub score: f64,
    /// Fraction of question keywords present in the chunk.
    pub overlap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResponse {
    pub keywords: Vec<String>,
    pub answer_context_chunks: Vec<ContextChunk>,
    pub citations: Vec<Citation>,
    pub confidence: Confidence,
}

/// Question keywords: lowercase tokens of three or more characters that
/// are not stop words, in first-seen order.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for token in tokenize(question) {
        if token.text.chars().count() < 3 || STOP_WORDS.contains(&token.text.as_str()) {
            continue;
        }
        if !keywords.contains(&token.text) {
            keywords.push(token.text);
        }
    }
    keywords
}

pub fn resolve_top_k(top_k: Option<usize>, settings: &RetrievalSettings) -> Result<usize> {
    let top_k = top_k.unwrap_or(settings.default_top_k);
    if top_k == 0 {
        return Err(LedgerError::invalid("top_k must be at least 1"));
    }
    if top_k > settings.max_top_k {
        return Err(LedgerError::LimitExceeded {
            requested: top_k,
            max: settings.max_top_k,
        });
    }
    Ok(top_k)
}

/// Derive confidence from the overlap of the selected chunks.
pub fn confidence(overlaps: &[f64], settings: &RetrievalSettings) -> Confidence {
    let supporting = overlaps
        .iter()
        .filter(|o| **o >= settings.weak_overlap)
        .count();
    let strong = overlaps
        .iter()
        .filter(|o| **o >= settings.strong_overlap)
        .count();

    if supporting >= settings.high_support && strong >= settings.medium_support {
        Confidence::High
    } else if supporting >= settings.medium_support && strong >= 1 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .nth(EXCERPT_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let head = &text[..cut];
    match head.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => head[..pos].to_string(),
        _ => head.to_string(),
    }
}

/// Select the top-k chunks for `question` and build their citations.
pub async fn retrieve_context(
    store: &dyn Store,
    question: &str,
    top_k: Option<usize>,
    project_filter: Option<&str>,
    settings: &RetrievalSettings,
) -> Result<RetrievalResponse> {
    let top_k = resolve_top_k(top_k, settings)?;
    if tokenize(question).is_empty() {
        return Err(LedgerError::invalid("question contains no searchable words"));
    }
    if let Some(project) = project_filter {
        if store.get_project(project).await?.is_none() {
            return Err(LedgerError::not_found(
                format!("project {project}"),
                "list projects to see valid ids",
            ));
        }
    }

    let keywords = extract_keywords(question);
    if keywords.is_empty() {
        return Ok(RetrievalResponse {
            keywords,
            answer_context_chunks: Vec::new(),
            citations: Vec::new(),
            confidence: Confidence::Low,
        });
    }

    let query = ParsedQuery {
        groups: keywords
            .iter()
            .map(|k| vec![Clause::Term(k.clone())])
            .collect(),
    };
    let candidates = store
        .search_candidates(&keywords, settings.include_historical)
        .await?;

    let mut ranked = Vec::new();
    for candidate in &candidates {
        if project_filter.is_some() && candidate.document.project_id.as_deref() != project_filter {
            continue;
        }
        let analysis = analyze(candidate, &query);
        for chunk in analysis.chunks {
            if chunk.terms.is_empty() {
                continue;
            }
            let overlap = chunk.terms.len() as f64 / keywords.len() as f64;
            let score = overlap + TF_WEIGHT * chunk.density();
            ranked.push((candidate, chunk.position, overlap, score));
        }
    }
    ranked.sort_by(|a, b| {
        b.3.total_cmp(&a.3)
            .then_with(|| tie_break(&a.0.document, &b.0.document))
            .then(a.1.cmp(&b.1))
    });
    ranked.truncate(top_k);

    let mut latest_by_path: HashMap<String, u32> = HashMap::new();
    let mut chunks = Vec::with_capacity(ranked.len());
    let mut citations = Vec::with_capacity(ranked.len());
    let mut overlaps = Vec::with_capacity(ranked.len());

    for (candidate, position, overlap, score) in ranked {
        let doc = &candidate.document;
        let chunk = &candidate.chunks[position];
        let latest_version = match latest_by_path.get(&doc.path).copied() {
            Some(v) => v,
            None => {
                let v = store
                    .latest_version(&doc.path)
                    .await?
                    .map(|l| l.version)
                    .unwrap_or(doc.version);
                latest_by_path.insert(doc.path.clone(), v);
                v
            }
        };

        citations.push(Citation {
            document_id: doc.id.clone(),
            filename: doc.filename.clone(),
            path: doc.path.clone(),
            chunk_id: chunk.id.clone(),
            excerpt: excerpt(&chunk.text),
            version: doc.version,
            latest_version,
            is_latest: doc.version == latest_version,
        });
        chunks.push(ContextChunk {
            chunk_id: chunk.id.clone(),
            document_id: doc.id.clone(),
            path: doc.path.clone(),
            title: doc.title.clone(),
            version: doc.version,
            text: chunk.text.clone(),
            score,
            overlap,
        });
        overlaps.push(overlap);
    }

    let confidence = confidence(&overlaps, settings);
    tracing::debug!(
        keywords = keywords.len(),
        candidates = candidates.len(),
        selected = chunks.len(),
        confidence = ?confidence,
        "context retrieved"
    );

    Ok(RetrievalResponse {
        keywords,
        answer_context_chunks: chunks,
        citations,
        confidence,
    })
}

/// Re-annotate earlier citations against the current latest versions.
pub async fn resolve_citations(store: &dyn Store, citations: &[Citation]) -> Result<Vec<Citation>> {
    let mut out = Vec::with_capacity(citations.len());
    for citation in citations {
        let latest = store.latest_version(&citation.path).await?.ok_or_else(|| {
            LedgerError::not_found(
                format!("path {}", citation.path),
                "the cited document has been deleted",
            )
        })?;
        out.push(Citation {
            latest_version: latest.version,
            is_latest: citation.version == latest.version,
            ..citation.clone()
        });
    }
    Ok(out)
}
