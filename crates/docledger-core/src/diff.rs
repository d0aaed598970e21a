//! Line-level diff between two versions of a document.
//!
//! Alignment is a plain longest-common-subsequence table over lines, built
//! only for the part left after stripping the common prefix and suffix and
//! capped by [`DiffSettings::max_cells`]. The walk prefers a removal over an addition when both keep the LCS optimal,
//! which makes `diff(a, b)` and `diff(b, a)` anchor on different lines in
//! some inputs. That asymmetry is expected.
//!
//! Unchanged and added lines carry their line number in `b`; removed lines
//! carry their line number in `a`.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::store::Store;
use crate::versions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Added,
    Removed,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    #[serde(rename = "type")]
    pub kind: LineKind,
    pub line_number: usize,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDiff {
    pub path: String,
    pub version_a: u32,
    pub version_b: u32,
    pub lines: Vec<DiffLine>,
    pub summary: DiffSummary,
}

/// Bounds on the alignment table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffSettings {
    /// Largest `(n + 1) * (m + 1)` table allowed after the common prefix and
    /// suffix are stripped.
    pub max_cells: usize,
}

impl Default for DiffSettings {
    fn default() -> Self {
        Self {
            max_cells: 25_000_000,
        }
    }
}

/// Diff two texts line by line.
///
/// Fails with `LIMIT_EXCEEDED` when the differing middle of the two texts
/// would need more than `settings.max_cells` table cells.
pub fn diff_lines(a: &str, b: &str, settings: &DiffSettings) -> Result<(Vec<DiffLine>, DiffSummary)> {
    let a: Vec<&str> = a.lines().collect();
    let b: Vec<&str> = b.lines().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let a_mid = &a[prefix..a.len() - suffix];
    let b_mid = &b[prefix..b.len() - suffix];
    let (n, m) = (a_mid.len(), b_mid.len());

    let mut lines = Vec::with_capacity(a.len().max(b.len()));
    let mut summary = DiffSummary::default();

    for (k, text) in b[..prefix].iter().enumerate() {
        lines.push(line(LineKind::Unchanged, k + 1, text));
    }
    summary.unchanged += prefix;

    let lcs = lcs_table(a_mid, b_mid, settings)?;
    let width = m + 1;
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && a_mid[i] == b_mid[j] {
            lines.push(line(LineKind::Unchanged, prefix + j + 1, b_mid[j]));
            summary.unchanged += 1;
            i += 1;
            j += 1;
        } else if i < n && (j == m || lcs[(i + 1) * width + j] >= lcs[i * width + j + 1]) {
            lines.push(line(LineKind::Removed, prefix + i + 1, a_mid[i]));
            summary.removed += 1;
            i += 1;
        } else {
            lines.push(line(LineKind::Added, prefix + j + 1, b_mid[j]));
            summary.added += 1;
            j += 1;
        }
    }

    let tail = b.len() - suffix;
    for (k, text) in b[tail..].iter().enumerate() {
        lines.push(line(LineKind::Unchanged, tail + k + 1, text));
    }
    summary.unchanged += suffix;

    Ok((lines, summary))
}

/// Flat `(n + 1) x (m + 1)` table where cell `i * (m + 1) + j` holds the LCS
/// length of `a[i..]` and `b[j..]`. Empty when either side is empty.
fn lcs_table(a: &[&str], b: &[&str], settings: &DiffSettings) -> Result<Vec<u32>> {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        return Ok(Vec::new());
    }
    let cells = (n + 1).saturating_mul(m + 1);
    if cells > settings.max_cells {
        return Err(LedgerError::LimitExceeded {
            requested: cells,
            max: settings.max_cells,
        });
    }

    let mut lcs: Vec<u32> = Vec::new();
    lcs.try_reserve_exact(cells).map_err(|e| {
        LedgerError::Internal(anyhow::Error::new(e).context("diff table allocation failed"))
    })?;
    lcs.resize(cells, 0);

    let width = m + 1;
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if a[i] == b[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }
    Ok(lcs)
}

fn line(kind: LineKind, line_number: usize, content: &str) -> DiffLine {
    DiffLine {
        kind,
        line_number,
        content: content.to_string(),
    }
}

/// Compare two stored versions of `path`.
pub async fn compare_versions(
    store: &dyn Store,
    path: &str,
    version_a: u32,
    version_b: u32,
    settings: &DiffSettings,
) -> Result<VersionDiff> {
    versions::validate_version(version_a)?;
    versions::validate_version(version_b)?;
    let doc_a = versions::get_version(store, path, version_a).await?;
    let doc_b = versions::get_version(store, path, version_b).await?;

    let missing = |v: u32| {
        LedgerError::not_found(
            format!("content of version {v} of {path}"),
            "the version row exists but its content is missing; re-index the path",
        )
    };
    let text_a = store.get_content(&doc_a.id).await?.ok_or_else(|| missing(version_a))?;
    let text_b = store.get_content(&doc_b.id).await?.ok_or_else(|| missing(version_b))?;

    let (lines, summary) = diff_lines(&text_a, &text_b, settings)?;
    tracing::debug!(
        path = %path,
        version_a,
        version_b,
        added = summary.added,
        removed = summary.removed,
        unchanged = summary.unchanged,
        "versions compared"
    );

    Ok(VersionDiff {
        path: path.to_string(),
        version_a,
        version_b,
        lines,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(a: &str, b: &str) -> (Vec<DiffLine>, DiffSummary) {
        diff_lines(a, b, &DiffSettings::default()).unwrap()
    }

    fn kinds(lines: &[DiffLine]) -> Vec<(LineKind, usize, &str)> {
        lines
            .iter()
            .map(|l| (l.kind, l.line_number, l.content.as_str()))
            .collect()
    }

    #[test]
    fn identical_texts_are_all_unchanged() {
        let text = "a\nb\nc";
        let (lines, summary) = diff(text, text);
        assert_eq!(summary, DiffSummary { added: 0, removed: 0, unchanged: 3 });
        assert!(lines.iter().all(|l| l.kind == LineKind::Unchanged));
    }

    #[test]
    fn single_line_edit() {
        let a = "# Docker\nUse volumes for persistence.";
        let b = "# Docker\nUse named volumes for persistence.";
        let (lines, summary) = diff(a, b);
        assert_eq!(summary, DiffSummary { added: 1, removed: 1, unchanged: 1 });
        assert_eq!(
            kinds(&lines),
            vec![
                (LineKind::Unchanged, 1, "# Docker"),
                (LineKind::Removed, 2, "Use volumes for persistence."),
                (LineKind::Added, 2, "Use named volumes for persistence."),
            ]
        );
    }

    #[test]
    fn swapped_lines_anchor_differently_in_each_direction() {
        let (forward, _) = diff("x\ny", "y\nx");
        assert_eq!(
            kinds(&forward),
            vec![
                (LineKind::Removed, 1, "x"),
                (LineKind::Unchanged, 1, "y"),
                (LineKind::Added, 2, "x"),
            ]
        );

        let (backward, _) = diff("y\nx", "x\ny");
        assert_eq!(
            kinds(&backward),
            vec![
                (LineKind::Removed, 1, "y"),
                (LineKind::Unchanged, 1, "x"),
                (LineKind::Added, 2, "y"),
            ]
        );
        // Not a mirror image: the forward diff keeps "y", the backward keeps "x".
        assert_ne!(forward[1].content, backward[1].content);
    }

    #[test]
    fn empty_sides() {
        let (lines, summary) = diff("", "a\nb");
        assert_eq!(summary, DiffSummary { added: 2, removed: 0, unchanged: 0 });
        assert_eq!(lines[1].line_number, 2);

        let (_, summary) = diff("a\nb", "");
        assert_eq!(summary, DiffSummary { added: 0, removed: 2, unchanged: 0 });
    }

    #[test]
    fn output_follows_b_order() {
        let (lines, _) = diff("a\nb\nc\nd", "a\nc\ne\nd");
        let b_side: Vec<&str> = lines
            .iter()
            .filter(|l| l.kind != LineKind::Removed)
            .map(|l| l.content.as_str())
            .collect();
        assert_eq!(b_side, vec!["a", "c", "e", "d"]);
    }

    #[test]
    fn common_suffix_keeps_b_line_numbers() {
        let (lines, summary) = diff("a\nx\nz\nz", "a\ny\nz\nz");
        assert_eq!(summary, DiffSummary { added: 1, removed: 1, unchanged: 3 });
        assert_eq!(
            kinds(&lines),
            vec![
                (LineKind::Unchanged, 1, "a"),
                (LineKind::Removed, 2, "x"),
                (LineKind::Added, 2, "y"),
                (LineKind::Unchanged, 3, "z"),
                (LineKind::Unchanged, 4, "z"),
            ]
        );
    }

    #[test]
    fn oversized_middle_is_limit_exceeded() {
        let a: String = (0..200).map(|i| format!("a{i}\n")).collect();
        let b: String = (0..200).map(|i| format!("b{i}\n")).collect();
        let settings = DiffSettings { max_cells: 10_000 };
        let err = diff_lines(&a, &b, &settings).unwrap_err();
        assert_eq!(err.code(), "LIMIT_EXCEEDED");
    }

    #[test]
    fn long_shared_context_stays_under_the_cap() {
        let shared: String = (0..50_000).map(|i| format!("line {i}\n")).collect();
        let a = format!("{shared}old\n{shared}");
        let b = format!("{shared}new\n{shared}");
        let settings = DiffSettings { max_cells: 16 };
        let (lines, summary) = diff_lines(&a, &b, &settings).unwrap();
        assert_eq!(summary, DiffSummary { added: 1, removed: 1, unchanged: 100_000 });
        assert_eq!(lines[50_000].content, "old");
        assert_eq!(lines[50_001].line_number, 50_001);
    }
}
