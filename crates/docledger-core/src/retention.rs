//! Retention/Purge Policy Engine.
//!
//! [`evaluate`] is a pure function from a policy and the version table to
//! the versions eligible for deletion. Dry runs and real purges share it, so
//! a preview selects exactly what a real purge would delete. A path's latest
//! version is never a candidate.
//!
//! The policy itself is persisted by the store and only changes through
//! [`set_policy`].

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{LedgerError, Result};
use crate::models::{RetentionKind, RetentionPolicy};
use crate::store::{PurgeStats, Store, VersionInfo};

const SECONDS_PER_DAY: i64 = 86_400;

/// Build a validated policy with its human-readable description.
pub fn policy(kind: RetentionKind, value: u32) -> Result<RetentionPolicy> {
    let description = match kind {
        RetentionKind::All => "Keep every version".to_string(),
        RetentionKind::LastNVersions if value >= 1 => {
            format!("Keep the {value} most recent versions of each document")
        }
        RetentionKind::LastNDays if value >= 1 => {
            format!("Keep versions indexed in the last {value} days plus each latest version")
        }
        _ => {
            return Err(LedgerError::invalid(format!(
                "retention policy '{}' requires a value of at least 1",
                kind.as_str()
            )))
        }
    };
    Ok(RetentionPolicy {
        kind,
        value: if kind == RetentionKind::All { 0 } else { value },
        description,
    })
}

/// Parse a policy from its wire name (`all`, `last_n_versions`,
/// `last_n_days`) and optional value.
pub fn parse_policy(kind: &str, value: Option<u32>) -> Result<RetentionPolicy> {
    let parsed = RetentionKind::parse(kind).ok_or_else(|| {
        LedgerError::invalid(format!(
            "unknown retention policy '{kind}' (expected all, last_n_versions or last_n_days)"
        ))
    })?;
    policy(parsed, value.unwrap_or(0))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeCandidate {
    pub document_id: String,
    pub path: String,
    pub version: u32,
    pub indexed_at: i64,
    pub content_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurgeReport {
    pub dry_run: bool,
    pub policy: RetentionPolicy,
    pub candidates: Vec<PurgeCandidate>,
    pub versions_deleted: usize,
    pub space_freed_bytes: u64,
}

/// Versions eligible for deletion under `policy`, ordered by path then
/// version.
pub fn evaluate(policy: &RetentionPolicy, versions: &[VersionInfo], now: i64) -> Vec<PurgeCandidate> {
    let mut by_path: BTreeMap<&str, Vec<&VersionInfo>> = BTreeMap::new();
    for v in versions {
        by_path.entry(v.path.as_str()).or_default().push(v);
    }

    let mut out = Vec::new();
    for (_, mut rows) in by_path {
        rows.sort_by(|a, b| b.version.cmp(&a.version));
        for (rank, row) in rows.iter().enumerate() {
            if row.is_latest {
                continue;
            }
            let eligible = match policy.kind {
                RetentionKind::All => false,
                RetentionKind::LastNVersions => rank >= policy.value as usize,
                RetentionKind::LastNDays => {
                    let cutoff = now - i64::from(policy.value) * SECONDS_PER_DAY;
                    row.indexed_at < cutoff
                }
            };
            if eligible {
                out.push(PurgeCandidate {
                    document_id: row.document_id.clone(),
                    path: row.path.clone(),
                    version: row.version,
                    indexed_at: row.indexed_at,
                    content_bytes: row.content_bytes,
                });
            }
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path).then(a.version.cmp(&b.version)));
    out
}

pub async fn get_policy(store: &dyn Store) -> Result<RetentionPolicy> {
    store.retention_policy().await
}

pub async fn set_policy(store: &dyn Store, policy: &RetentionPolicy) -> Result<()> {
    // Re-validate so hand-built values cannot bypass the checks.
    let checked = self::policy(policy.kind, policy.value)?;
    store.set_retention_policy(&checked).await?;
    tracing::info!(policy = checked.kind.as_str(), value = checked.value, "retention policy updated");
    Ok(())
}

/// Current policy and its candidates.
pub async fn plan(store: &dyn Store, now: i64) -> Result<(RetentionPolicy, Vec<PurgeCandidate>)> {
    let policy = store.retention_policy().await?;
    let versions = store.all_versions().await?;
    let candidates = evaluate(&policy, &versions, now);
    Ok((policy, candidates))
}

/// Delete exactly `candidates`.
pub async fn execute(store: &dyn Store, candidates: &[PurgeCandidate]) -> Result<PurgeStats> {
    let ids: Vec<String> = candidates.iter().map(|c| c.document_id.clone()).collect();
    store.delete_versions(&ids).await
}

/// Assemble the report for a dry run or a completed purge.
pub fn report(
    policy: RetentionPolicy,
    candidates: Vec<PurgeCandidate>,
    dry_run: bool,
    stats: Option<PurgeStats>,
) -> PurgeReport {
    let stats = stats.unwrap_or_else(|| PurgeStats {
        versions_deleted: candidates.len(),
        space_freed_bytes: candidates.iter().map(|c| c.content_bytes).sum(),
    });
    PurgeReport {
        dry_run,
        policy,
        candidates,
        versions_deleted: stats.versions_deleted,
        space_freed_bytes: stats.space_freed_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(path: &str, version: u32, latest: bool, indexed_at: i64) -> VersionInfo {
        VersionInfo {
            document_id: format!("{path}@{version}"),
            path: path.to_string(),
            version,
            is_latest: latest,
            indexed_at,
            content_bytes: 10,
        }
    }

    fn three_versions() -> Vec<VersionInfo> {
        vec![
            row("a.md", 1, false, 100),
            row("a.md", 2, false, 200),
            row("a.md", 3, true, 300),
        ]
    }

    #[test]
    fn all_keeps_everything() {
        let p = policy(RetentionKind::All, 0).unwrap();
        assert!(evaluate(&p, &three_versions(), 1_000).is_empty());
    }

    #[test]
    fn last_one_version_marks_older_rows() {
        let p = policy(RetentionKind::LastNVersions, 1).unwrap();
        let c = evaluate(&p, &three_versions(), 1_000);
        let versions: Vec<u32> = c.iter().map(|c| c.version).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn last_n_versions_keeps_n_per_path() {
        let p = policy(RetentionKind::LastNVersions, 2).unwrap();
        let mut rows = three_versions();
        rows.push(row("b.md", 1, true, 50));
        let c = evaluate(&p, &rows, 1_000);
        assert_eq!(c.len(), 1);
        assert_eq!((c[0].path.as_str(), c[0].version), ("a.md", 1));
    }

    #[test]
    fn last_n_days_always_keeps_latest() {
        let p = policy(RetentionKind::LastNDays, 1).unwrap();
        let now = 300 + 10 * SECONDS_PER_DAY;
        let c = evaluate(&p, &three_versions(), now);
        assert_eq!(c.len(), 2);
        assert!(c.iter().all(|c| c.version != 3));
    }

    #[test]
    fn last_n_days_keeps_recent_history() {
        let p = policy(RetentionKind::LastNDays, 1).unwrap();
        let now = 250 + SECONDS_PER_DAY;
        let c = evaluate(&p, &three_versions(), now);
        let versions: Vec<u32> = c.iter().map(|c| c.version).collect();
        assert_eq!(versions, vec![1, 2]);

        let now = 150 + SECONDS_PER_DAY;
        let c = evaluate(&p, &three_versions(), now);
        let versions: Vec<u32> = c.iter().map(|c| c.version).collect();
        assert_eq!(versions, vec![1]);
    }

    #[test]
    fn zero_values_are_rejected() {
        assert_eq!(
            policy(RetentionKind::LastNVersions, 0).unwrap_err().code(),
            "INVALID_INPUT"
        );
        assert_eq!(
            policy(RetentionKind::LastNDays, 0).unwrap_err().code(),
            "INVALID_INPUT"
        );
        assert_eq!(parse_policy("forever", None).unwrap_err().code(), "INVALID_INPUT");
    }

    #[test]
    fn dry_run_report_counts_candidates() {
        let p = policy(RetentionKind::LastNVersions, 1).unwrap();
        let c = evaluate(&p, &three_versions(), 0);
        let r = report(p, c, true, None);
        assert_eq!(r.versions_deleted, 2);
        assert_eq!(r.space_freed_bytes, 20);
    }
}
