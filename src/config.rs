//! TOML configuration for campus-index.
//!
//! Every section except `[storage]` is optional and falls back to the
//! defaults documented in `config/cidx.example.toml`.

use anyhow::{Context, Result};
use campus_index_core::chunk::ChunkingParams;
use campus_index_core::rank::Thresholds;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding every partition and the `_catalog` logs.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_passage_chars")]
    pub min_passage_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_passage_chars: default_min_passage_chars(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            min_passage_chars: self.min_passage_chars,
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}
fn default_min_passage_chars() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    #[serde(default = "default_context_passages")]
    pub context_passages: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_distance: default_max_distance(),
            min_similarity: default_min_similarity(),
            context_passages: default_context_passages(),
        }
    }
}

impl RetrievalConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            max_distance: self.max_distance,
            min_similarity: self.min_similarity,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_distance() -> f32 {
    2.0
}
fn default_min_similarity() -> f32 {
    0.0
}
fn default_context_passages() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL override for `openai` and `ollama`.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// Rewrite a catalog log once it grows past this many lines. 0 disables.
    #[serde(default = "default_compact_after")]
    pub compact_after: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            compact_after: default_compact_after(),
        }
    }
}

fn default_compact_after() -> usize {
    512
}

impl Config {
    /// Default configuration rooted at `root`, with embeddings disabled.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig { root: root.into() },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        // Validate chunking
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
        }

        // Validate retrieval
        if self.retrieval.top_k < 1 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.max_distance.is_nan() || self.retrieval.max_distance <= 0.0 {
            anyhow::bail!("retrieval.max_distance must be > 0");
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_similarity) {
            anyhow::bail!("retrieval.min_similarity must be in [-1.0, 1.0]");
        }

        // Validate embedding
        let embedding = &self.embedding;
        match embedding.provider.as_str() {
            "disabled" | "local" => {}
            "openai" | "ollama" => {
                if embedding.model.is_none() {
                    anyhow::bail!(
                        "embedding.model must be specified when provider is '{}'",
                        embedding.provider
                    );
                }
                if embedding.dims.unwrap_or(0) == 0 {
                    anyhow::bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        embedding.provider
                    );
                }
            }
            "hash" => {
                if embedding.dims.unwrap_or(0) == 0 {
                    anyhow::bail!("embedding.dims must be > 0 when provider is 'hash'");
                }
            }
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, hash, or local.",
                other
            ),
        }
        if embedding.is_enabled() && embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
