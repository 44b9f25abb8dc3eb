//! TOML configuration.
//!
//! Loaded once at startup by [`load_config`], which parses the file and
//! validates cross-field constraints. Every section except `[db]` has
//! defaults, so a minimal config is just the database path.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum window size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive windows.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
    /// Maximum number of chunks loaded into the lexical index.
    #[serde(default = "default_corpus_limit")]
    pub corpus_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            rrf_k: default_rrf_k(),
            corpus_limit: default_corpus_limit(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_rrf_k() -> u32 {
    60
}
fn default_corpus_limit() -> usize {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
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
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
            url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Lifetime of a cached answer.
    #[serde(default = "default_response_ttl")]
    pub response_ttl_secs: u64,
    /// Lifetime of a session's message log after its last message.
    #[serde(default = "default_history_ttl")]
    pub history_ttl_secs: u64,
    /// Number of recent messages sent to the generator.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Upper bound on cached answers, and separately on live sessions.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            response_ttl_secs: default_response_ttl(),
            history_ttl_secs: default_history_ttl(),
            history_limit: default_history_limit(),
            max_entries: default_cache_max_entries(),
        }
    }
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

fn default_disabled() -> String {
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
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_response_ttl() -> u64 {
    3600
}
fn default_history_ttl() -> u64 {
    86_400
}
fn default_history_limit() -> usize {
    10
}
fn default_cache_max_entries() -> u64 {
    10_000
}
fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.rrf_k < 1 {
        anyhow::bail!("retrieval.rrf_k must be >= 1");
    }
    if config.retrieval.corpus_limit < 1 {
        anyhow::bail!("retrieval.corpus_limit must be >= 1");
    }
    if config.cache.max_entries == 0 {
        anyhow::bail!("cache.max_entries must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" | "cohere" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, cohere, or local.",
            other
        ),
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "disabled" => {}
        "openai" | "ollama" | "cohere" => {
            if config.generation.model.is_none() {
                anyhow::bail!(
                    "generation.model must be specified when provider is '{}'",
                    config.generation.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, ollama, or cohere.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"./data/rag.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.rrf_k, 60);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.generation.provider, "disabled");
        assert_eq!(config.cache.history_limit, 10);
        assert_eq!(config.cache.max_entries, 10_000);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = parse_config(
            "[db]\npath = \"x\"\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_remote_embedding_requires_model_and_dims() {
        let missing_dims = parse_config(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"cohere\"\nmodel = \"embed-multilingual-v3.0\"\n",
        );
        assert!(missing_dims.is_err());

        let ok = parse_config(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"cohere\"\nmodel = \"embed-multilingual-v3.0\"\ndims = 1024\n",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[generation]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn test_zero_top_k_rejected() {
        assert!(parse_config("[db]\npath = \"x\"\n[retrieval]\ntop_k = 0\n").is_err());
    }

    #[test]
    fn test_zero_cache_capacity_rejected() {
        assert!(parse_config("[db]\npath = \"x\"\n[cache]\nmax_entries = 0\n").is_err());
    }
}
