//! Hasher/Chunker: content normalization, hashing, metadata extraction and
//! heading/paragraph-aware chunk splitting.
//!
//! Everything here is a pure function over the input bytes. Side effects
//! (persisting versions and chunks) happen in the store.
//!
//! # Algorithm
//!
//! 1. Strip a UTF-8 BOM and convert `\r\n` / `\r` line endings to `\n`.
//! 2. Hash the normalized text with SHA-256 (hex). Unsupported or
//!    non-UTF-8 input is hashed over its raw bytes and indexed
//!    metadata-only.
//! 3. Split the text into sections at heading lines (`#` .. `######`
//!    outside fenced code blocks).
//! 4. Inside a section, split into paragraphs at blank lines and accumulate
//!    paragraphs into a chunk until adding the next would exceed
//!    `max_chars`.
//! 5. A paragraph longer than `max_chars` is hard-split at whitespace;
//!    consecutive pieces of such a split share up to `overlap_chars`
//!    characters.
//!
//! Chunk offsets are byte offsets into the normalized text and every
//! chunk's text is exactly `text[start_offset..end_offset]`.
//!
//! ```rust
//! use docledger_core::chunk::{prepare, ChunkingParams};
//!
//! let prepared = prepare(b"# Docker\nUse volumes.", "md", "docker", &ChunkingParams::default());
//! assert_eq!(prepared.title.as_deref(), Some("Docker"));
//! assert_eq!(prepared.spans.len(), 1);
//! ```

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Extensions whose bytes are treated as text and chunked.
const TEXT_EXTENSIONS: &[&str] = &[
    "md", "markdown", "mdx", "txt", "text", "rst", "org", "adoc", "csv", "json", "yaml", "yml",
    "toml", "html", "htm", "xml", "tex",
];

const EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            overlap_chars: 200,
        }
    }
}

/// Byte range of one chunk inside [`PreparedContent::text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
}

/// Output of [`prepare`]: everything the store needs to append a version.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedContent {
    /// Normalized content. Empty for metadata-only documents.
    pub text: String,
    pub content_hash: String,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub headings: Vec<String>,
    pub excerpt: String,
    pub spans: Vec<ChunkSpan>,
    /// `false` when the input degraded to metadata-only indexing.
    pub indexable: bool,
}

/// A lowercase token and its byte range in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

pub fn is_text_extension(extension: &str) -> bool {
    let ext = extension.to_ascii_lowercase();
    TEXT_EXTENSIONS.contains(&ext.as_str())
}

/// Hex SHA-256 of the given bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Strip a BOM and normalize line endings to `\n`.
pub fn normalize(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Normalize, hash, extract metadata and compute chunk spans.
///
/// `fallback_title` (usually the file stem) is used when the content has no
/// front-matter title and no top-level heading.
pub fn prepare(
    bytes: &[u8],
    extension: &str,
    fallback_title: &str,
    params: &ChunkingParams,
) -> PreparedContent {
    let fallback = if fallback_title.is_empty() {
        None
    } else {
        Some(fallback_title.to_string())
    };

    let decoded = if is_text_extension(extension) {
        std::str::from_utf8(bytes).ok()
    } else {
        None
    };

    let Some(raw) = decoded else {
        return PreparedContent {
            text: String::new(),
            content_hash: hash_bytes(bytes),
            title: fallback,
            tags: Vec::new(),
            headings: Vec::new(),
            excerpt: String::new(),
            spans: Vec::new(),
            indexable: false,
        };
    };

    let text = normalize(raw);
    let content_hash = hash_bytes(text.as_bytes());
    let front = parse_front_matter(&text);
    let body_start = front.as_ref().map(|f| f.body_start).unwrap_or(0);
    let headings = extract_headings(&text[body_start..]);

    let title = front
        .as_ref()
        .and_then(|f| f.title.clone())
        .or_else(|| first_h1(&text[body_start..]))
        .or(fallback);
    let tags = front.map(|f| f.tags).unwrap_or_default();
    let excerpt = make_excerpt(&text[body_start..]);
    let spans = split_spans(&text, params);

    PreparedContent {
        text,
        content_hash,
        title,
        tags,
        headings,
        excerpt,
        spans,
        indexable: true,
    }
}

/// Materialize [`Chunk`] rows for one document version.
pub fn build_chunks(document_id: &str, prepared: &PreparedContent) -> Vec<Chunk> {
    prepared
        .spans
        .iter()
        .enumerate()
        .map(|(i, span)| {
            let text = &prepared.text[span.start..span.end];
            Chunk {
                id: format!("{document_id}:{i}"),
                document_id: document_id.to_string(),
                chunk_index: i as u32,
                text: text.to_string(),
                start_offset: span.start,
                end_offset: span.end,
                hash: hash_bytes(text.as_bytes()),
            }
        })
        .collect()
}

/// Lowercase alphanumeric tokens with byte offsets into `text`.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if c.is_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            tokens.push(make_token(text, s, i));
        }
    }
    if let Some(s) = start {
        tokens.push(make_token(text, s, text.len()));
    }
    tokens
}

fn make_token(text: &str, start: usize, end: usize) -> Token {
    Token {
        text: text[start..end].to_lowercase(),
        start,
        end,
    }
}

/// Token postings for a chunk: term → token positions.
pub fn postings(text: &str) -> BTreeMap<String, Vec<u32>> {
    let mut map: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for (pos, token) in tokenize(text).into_iter().enumerate() {
        map.entry(token.text).or_default().push(pos as u32);
    }
    map
}

// ---------- metadata ----------

struct FrontMatter {
    title: Option<String>,
    tags: Vec<String>,
    body_start: usize,
}

fn parse_front_matter(text: &str) -> Option<FrontMatter> {
    let rest = text.strip_prefix("---\n")?;
    let mut offset = 4;
    let mut title = None;
    let mut tags = Vec::new();
    let mut in_tag_list = false;

    for line in rest.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim();
        if trimmed == "---" {
            return Some(FrontMatter {
                title,
                tags,
                body_start: offset,
            });
        }

        if in_tag_list {
            if let Some(item) = trimmed.strip_prefix("- ") {
                push_tag(&mut tags, item);
                continue;
            }
            in_tag_list = false;
        }

        if let Some(value) = trimmed.strip_prefix("title:") {
            let value = unquote(value.trim());
            if !value.is_empty() {
                title = Some(value.to_string());
            }
        } else if let Some(value) = trimmed.strip_prefix("tags:") {
            let value = value.trim();
            if value.is_empty() {
                in_tag_list = true;
            } else {
                let inner = value.trim_start_matches('[').trim_end_matches(']');
                for item in inner.split(',') {
                    push_tag(&mut tags, item);
                }
            }
        }
    }

    // Unterminated front matter is treated as body text.
    None
}

fn push_tag(tags: &mut Vec<String>, raw: &str) {
    let tag = unquote(raw.trim());
    if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
        tags.push(tag.to_string());
    }
}

fn unquote(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'')
}

/// Heading level and title when `line` is an ATX heading.
fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    let title = rest.trim();
    if title.is_empty() {
        None
    } else {
        Some((level, title))
    }
}

fn extract_headings(body: &str) -> Vec<String> {
    let mut headings = Vec::new();
    let mut in_fence = false;
    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some((_, title)) = heading(line) {
            headings.push(title.to_string());
        }
    }
    headings
}

fn first_h1(body: &str) -> Option<String> {
    let mut in_fence = false;
    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            if let Some((1, title)) = heading(line) {
                return Some(title.to_string());
            }
        }
    }
    None
}

/// First 500 characters of whitespace-collapsed body text, cut at a word
/// boundary and suffixed with `...` when truncated.
fn make_excerpt(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= EXCERPT_CHARS {
        return collapsed;
    }
    let cut = forward_chars(&collapsed, 0, EXCERPT_CHARS);
    let head = &collapsed[..cut];
    let head = match head.rfind(' ') {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    };
    format!("{head}...")
}

// ---------- splitting ----------

/// Byte index `n` characters after `from`, clamped to the end of `text`.
pub(crate) fn forward_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Section byte ranges: a new section starts at every heading line.
fn sections(text: &str) -> Vec<(usize, usize)> {
    let mut starts = vec![0];
    let mut in_fence = false;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches('\n');
        if content.trim_start().starts_with("```") {
            in_fence = !in_fence;
        } else if !in_fence && offset > 0 && heading(content).is_some() {
            starts.push(offset);
        }
        offset += line.len();
    }

    let mut ranges = Vec::with_capacity(starts.len());
    for (i, start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        ranges.push((*start, end));
    }
    ranges
}

/// Paragraph byte ranges within `[start, end)`, trimmed of surrounding
/// whitespace.
fn paragraphs(text: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut offset = start;

    for line in text[start..end].split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let content = line.trim_end();
        if content.trim().is_empty() {
            if let Some(p) = current.take() {
                out.push(p);
            }
            continue;
        }
        let leading = content.len() - content.trim_start().len();
        let line_end = line_start + content.len();
        current = match current {
            Some((s, _)) => Some((s, line_end)),
            None => Some((line_start + leading, line_end)),
        };
    }
    if let Some(p) = current {
        out.push(p);
    }
    out
}

fn split_spans(text: &str, params: &ChunkingParams) -> Vec<ChunkSpan> {
    let max_chars = params.max_chars.max(1);
    let overlap = params.overlap_chars.min(max_chars.saturating_sub(1));
    let mut spans = Vec::new();

    for (sec_start, sec_end) in sections(text) {
        let mut current: Option<(usize, usize)> = None;
        let section_first = spans.len();

        for (p_start, p_end) in paragraphs(text, sec_start, sec_end) {
            if let Some((c_start, c_end)) = current {
                if char_len(&text[c_start..p_end]) <= max_chars {
                    current = Some((c_start, p_end));
                    continue;
                }
                spans.push(ChunkSpan {
                    start: c_start,
                    end: c_end,
                });
                current = None;
            }

            // Repeat the tail of the previous chunk in this section.
            let start = match spans.last() {
                Some(prev) if spans.len() > section_first => {
                    overlap_start(text, *prev, p_start, p_end, overlap, max_chars)
                }
                _ => p_start,
            };

            if char_len(&text[start..p_end]) > max_chars {
                hard_split(text, start, p_end, max_chars, overlap, &mut spans);
            } else {
                current = Some((start, p_end));
            }
        }

        if let Some((start, end)) = current {
            spans.push(ChunkSpan { start, end });
        }
    }

    spans
}

/// Start of the chunk that follows `prev` and ends at `next_end`: up to
/// `overlap` characters back into `prev`, on a word boundary. When the next
/// paragraph fits in one chunk the overlap is shortened so the whole chunk
/// stays within `max_chars`. Falls back to `next_start`.
fn overlap_start(
    text: &str,
    prev: ChunkSpan,
    next_start: usize,
    next_end: usize,
    overlap: usize,
    max_chars: usize,
) -> usize {
    if overlap == 0 {
        return next_start;
    }
    let mut at = back_chars(text, prev.end, overlap).max(prev.start);
    if char_len(&text[next_start..next_end]) <= max_chars {
        at = at.max(back_chars(text, next_end, max_chars));
    }
    if at >= prev.end {
        return next_start;
    }
    if !is_boundary(text, at) {
        match text[at..prev.end].find(char::is_whitespace) {
            Some(pos) => at += pos,
            None => return next_start,
        }
    }
    let rest = &text[at..next_start];
    at += rest.len() - rest.trim_start().len();
    if at <= prev.start || at >= prev.end {
        next_start
    } else {
        at
    }
}

/// Split one oversized paragraph at whitespace with bounded overlap.
fn hard_split(
    text: &str,
    start: usize,
    end: usize,
    max_chars: usize,
    overlap: usize,
    spans: &mut Vec<ChunkSpan>,
) {
    let mut s = start;
    while s < end {
        let window_end = forward_chars(text, s, max_chars).min(end);
        if window_end >= end {
            push_trimmed(text, s, end, spans);
            break;
        }

        let cut = text[s..window_end]
            .rfind(char::is_whitespace)
            .map(|pos| s + pos)
            .filter(|&pos| pos > s)
            .unwrap_or(window_end);
        push_trimmed(text, s, cut, spans);

        let mut next = cut;
        if overlap > 0 {
            let back = back_chars(text, cut, overlap).max(s);
            // Start the overlap on a word boundary.
            let aligned = match text[back..cut].find(char::is_whitespace) {
                Some(pos) if back > 0 && !is_boundary(text, back) => back + pos,
                _ => back,
            };
            if aligned > s {
                next = aligned;
            }
        }
        next += text[next..end].len() - text[next..end].trim_start().len();
        if next <= s {
            next = cut;
        }
        s = next;
    }
}

fn push_trimmed(text: &str, start: usize, end: usize, spans: &mut Vec<ChunkSpan>) {
    let slice = &text[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let trail = slice.len() - slice.trim_end().len();
    let (s, e) = (start + lead, end - trail);
    if s < e {
        spans.push(ChunkSpan { start: s, end: e });
    }
}

/// Byte index `n` characters before `from`, clamped to the start of `text`.
pub(crate) fn back_chars(text: &str, from: usize, n: usize) -> usize {
    if n == 0 {
        return from;
    }
    text[..from]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn is_boundary(text: &str, at: usize) -> bool {
    text[..at]
        .chars()
        .next_back()
        .map(|c| c.is_whitespace())
        .unwrap_or(true)
}
