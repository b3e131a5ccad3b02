use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub linker: LinkerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_chunk_length")]
    pub min_chunk_length: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_chunk_length: default_min_chunk_length(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    100
}
fn default_min_chunk_length() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct QualityConfig {
    /// Domain keywords that raise a chunk's quality score.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    [
        "strategy",
        "trading",
        "investment",
        "risk",
        "portfolio",
        "volatility",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Minimum cosine similarity for a chunk to qualify as context.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Maximum chunks a single source may contribute to the context.
    #[serde(default = "default_per_source_cap")]
    pub per_source_cap: usize,
    /// Upper bound on assembled context size, in characters.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_results: default_max_results(),
            per_source_cap: default_per_source_cap(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.78
}
fn default_max_results() -> usize {
    8
}
fn default_per_source_cap() -> usize {
    2
}
fn default_max_context_chars() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"` for the HTTP provider, `"stub"` for the deterministic
    /// offline embedder, `"disabled"` to reject embedding work.
    #[serde(default = "default_embed_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Input longer than this many characters is truncated before sending.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Concurrent embedding requests per document.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embed_provider(),
            model: None,
            dims: None,
            base_url: default_base_url(),
            max_input_chars: default_max_input_chars(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embed_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_input_chars() -> usize {
    8000
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_concurrency() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    /// `"openai"` for the HTTP provider, `"stub"` for canned offline
    /// responses, `"disabled"` to skip all reasoning calls.
    #[serde(default = "default_infer_provider")]
    pub provider: String,
    #[serde(default = "default_infer_model")]
    pub model: String,
    /// Cheaper model used for per-concept trust validation.
    #[serde(default = "default_validation_model")]
    pub validation_model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_infer_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: default_infer_provider(),
            model: default_infer_model(),
            validation_model: default_validation_model(),
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_infer_timeout_secs(),
        }
    }
}

impl InferenceConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_infer_provider() -> String {
    "disabled".to_string()
}
fn default_infer_model() -> String {
    "gpt-4o".to_string()
}
fn default_validation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_infer_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct LinkerConfig {
    /// How many high-trust blocks from other domains to consider.
    #[serde(default = "default_linker_top_n")]
    pub top_n: usize,
    /// Minimum trust score for a block to participate in linking.
    #[serde(default = "default_linker_min_trust")]
    pub min_trust: f64,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            top_n: default_linker_top_n(),
            min_trust: default_linker_min_trust(),
        }
    }
}

fn default_linker_top_n() -> usize {
    10
}
fn default_linker_min_trust() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Topics passed to the periodic refresh.
    #[serde(default)]
    pub refresh_topics: Vec<String>,
    /// Queries run as a periodic retrieval smoke test.
    #[serde(default)]
    pub smoke_queries: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            refresh_topics: Vec::new(),
            smoke_queries: Vec::new(),
        }
    }
}

fn default_interval_secs() -> u64 {
    1800
}

/// One candidate source in the static recommendation catalog.
///
/// The catalog is immutable configuration: a compiled-in default is used
/// when the config file does not provide `[[catalog]]` entries.
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogEntry {
    pub source: String,
    pub topics: Vec<String>,
    #[serde(default = "default_impact")]
    pub impact: String,
    #[serde(default)]
    pub complements: Vec<String>,
}

fn default_impact() -> String {
    "medium".to_string()
}

impl Config {
    /// Minimal in-memory configuration for tests and tooling.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("ragline.db"),
            },
            chunking: ChunkingConfig::default(),
            quality: QualityConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            inference: InferenceConfig::default(),
            linker: LinkerConfig::default(),
            scheduler: SchedulerConfig::default(),
            catalog: Vec::new(),
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

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }

    if !(0.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [0.0, 1.0]");
    }
    if config.retrieval.max_results == 0 {
        anyhow::bail!("retrieval.max_results must be >= 1");
    }
    if config.retrieval.per_source_cap == 0 {
        anyhow::bail!("retrieval.per_source_cap must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "stub" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or stub.",
            other
        ),
    }
    if config.embedding.provider == "openai" {
        if config.embedding.model.is_none() {
            anyhow::bail!("embedding.model must be specified when provider is 'openai'");
        }
        match config.embedding.dims {
            None | Some(0) => {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'")
            }
            Some(_) => {}
        }
    }

    match config.inference.provider.as_str() {
        "disabled" | "openai" | "stub" => {}
        other => anyhow::bail!(
            "Unknown inference provider: '{}'. Must be disabled, openai, or stub.",
            other
        ),
    }

    if !(0.0..=1.0).contains(&config.linker.min_trust) {
        anyhow::bail!("linker.min_trust must be in [0.0, 1.0]");
    }

    for entry in &config.catalog {
        match entry.impact.as_str() {
            "very_high" | "high" | "medium" | "low" => {}
            other => anyhow::bail!(
                "catalog entry '{}' has unknown impact tier '{}'",
                entry.source,
                other
            ),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_validates() {
        let config = Config::minimal();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let mut config = Config::minimal();
        config.chunking.overlap = config.chunking.chunk_size;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn openai_embedding_requires_model_and_dims() {
        let mut config = Config::minimal();
        config.embedding.provider = "openai".into();
        assert!(validate(&config).is_err());

        config.embedding.model = Some("text-embedding-3-small".into());
        config.embedding.dims = Some(1536);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn catalog_impact_tiers_are_checked() {
        let mut config = Config::minimal();
        config.catalog.push(CatalogEntry {
            source: "Somebody".into(),
            topics: vec!["a".into()],
            impact: "colossal".into(),
            complements: Vec::new(),
        });
        assert!(validate(&config).is_err());
    }
}
