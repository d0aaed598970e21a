use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docledger_core::chunk::ChunkingParams;
use docledger_core::diff::DiffSettings;
use docledger_core::retrieval::RetrievalSettings;
use docledger_core::search::SearchSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub diff: DiffConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default = "default_snippet_window")]
    pub snippet_window_chars: usize,
    #[serde(default = "default_snippet_lead")]
    pub snippet_lead_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_page_size: default_max_page_size(),
            snippet_window_chars: default_snippet_window(),
            snippet_lead_chars: default_snippet_lead(),
        }
    }
}

fn default_limit() -> usize {
    20
}
fn default_max_page_size() -> usize {
    100
}
fn default_snippet_window() -> usize {
    240
}
fn default_snippet_lead() -> usize {
    80
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    #[serde(default = "default_weak_overlap")]
    pub weak_overlap: f64,
    #[serde(default = "default_strong_overlap")]
    pub strong_overlap: f64,
    #[serde(default = "default_medium_support")]
    pub medium_support: usize,
    #[serde(default = "default_high_support")]
    pub high_support: usize,
    #[serde(default)]
    pub include_historical: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            weak_overlap: default_weak_overlap(),
            strong_overlap: default_strong_overlap(),
            medium_support: default_medium_support(),
            high_support: default_high_support(),
            include_historical: false,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_top_k() -> usize {
    20
}
fn default_weak_overlap() -> f64 {
    0.25
}
fn default_strong_overlap() -> f64 {
    0.5
}
fn default_medium_support() -> usize {
    2
}
fn default_high_support() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiffConfig {
    #[serde(default = "default_diff_max_cells")]
    pub max_cells: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_cells: default_diff_max_cells(),
        }
    }
}

fn default_diff_max_cells() -> usize {
    DiffSettings::default().max_cells
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_exclusions")]
    pub exclusions: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            concurrency: default_concurrency(),
            exclusions: default_exclusions(),
            follow_symlinks: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_concurrency() -> usize {
    4
}
fn default_exclusions() -> Vec<String> {
    vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/.DS_Store".to_string(),
        "**/*.tmp".to_string(),
        "**/*.log".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    pub fn chunking_params(&self) -> ChunkingParams {
        ChunkingParams {
            max_chars: self.chunking.max_chars,
            overlap_chars: self.chunking.overlap_chars,
        }
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            default_limit: self.search.default_limit,
            max_page_size: self.search.max_page_size,
            snippet_window_chars: self.search.snippet_window_chars,
            snippet_lead_chars: self.search.snippet_lead_chars,
        }
    }

    pub fn diff_settings(&self) -> DiffSettings {
        DiffSettings {
            max_cells: self.diff.max_cells,
        }
    }

    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            default_top_k: self.retrieval.default_top_k,
            max_top_k: self.retrieval.max_top_k,
            weak_overlap: self.retrieval.weak_overlap,
            strong_overlap: self.retrieval.strong_overlap,
            medium_support: self.retrieval.medium_support,
            high_support: self.retrieval.high_support,
            include_historical: self.retrieval.include_historical,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be smaller than chunking.max_chars");
    }

    // Validate search
    if config.search.max_page_size == 0 {
        anyhow::bail!("search.max_page_size must be >= 1");
    }
    if config.search.default_limit == 0 || config.search.default_limit > config.search.max_page_size
    {
        anyhow::bail!("search.default_limit must be in [1, search.max_page_size]");
    }
    if config.search.snippet_window_chars == 0 {
        anyhow::bail!("search.snippet_window_chars must be > 0");
    }
    if config.search.snippet_lead_chars >= config.search.snippet_window_chars {
        anyhow::bail!("search.snippet_lead_chars must be smaller than search.snippet_window_chars");
    }

    // Validate retrieval
    let r = &config.retrieval;
    if r.max_top_k == 0 || r.default_top_k == 0 || r.default_top_k > r.max_top_k {
        anyhow::bail!("retrieval.default_top_k must be in [1, retrieval.max_top_k]");
    }
    if !(0.0..=1.0).contains(&r.weak_overlap) || !(0.0..=1.0).contains(&r.strong_overlap) {
        anyhow::bail!("retrieval overlap thresholds must be in [0.0, 1.0]");
    }
    if r.weak_overlap > r.strong_overlap {
        anyhow::bail!("retrieval.weak_overlap must not exceed retrieval.strong_overlap");
    }
    if r.medium_support == 0 || r.medium_support > r.high_support {
        anyhow::bail!("retrieval.medium_support must be in [1, retrieval.high_support]");
    }

    if config.diff.max_cells == 0 {
        anyhow::bail!("diff.max_cells must be >= 1");
    }

    // Validate ingest
    if config.ingest.max_attempts == 0 {
        anyhow::bail!("ingest.max_attempts must be >= 1");
    }
    if config.ingest.concurrency == 0 {
        anyhow::bail!("ingest.concurrency must be >= 1");
    }
    for pattern in &config.ingest.exclusions {
        globset::Glob::new(pattern)
            .with_context(|| format!("Invalid exclusion pattern: '{}'", pattern))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"./data/ledger.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.max_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 200);
        assert_eq!(config.search.max_page_size, 100);
        assert_eq!(config.retrieval.default_top_k, 5);
        assert_eq!(config.diff.max_cells, 25_000_000);
        assert_eq!(config.ingest.max_attempts, 3);
        assert_eq!(config.ingest.exclusions.len(), 5);
        assert_eq!(config.server.bind, "127.0.0.1:7341");
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let err = parse(
            "[db]\npath = \"x.sqlite\"\n[chunking]\nmax_chars = 100\noverlap_chars = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap_chars"));
    }

    #[test]
    fn default_limit_cannot_exceed_page_cap() {
        let err = parse(
            "[db]\npath = \"x.sqlite\"\n[search]\ndefault_limit = 500\nmax_page_size = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("default_limit"));
    }

    #[test]
    fn bad_exclusion_glob_is_rejected() {
        let err = parse("[db]\npath = \"x.sqlite\"\n[ingest]\nexclusions = [\"a/[\"]\n").unwrap_err();
        assert!(err.to_string().contains("exclusion"));
    }
}
