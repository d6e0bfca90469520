//! TOML configuration.
//!
//! Only `[db]` is required; every other section falls back to defaults that
//! match a fresh install (`./data/downloads`, 8000-character chunks,
//! embeddings disabled, arXiv export API with a 3 second courtesy delay).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub downloads: DownloadsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub arxiv: ArxivConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    "knowledge".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DownloadsConfig {
    #[serde(default = "default_downloads_dir")]
    pub dir: PathBuf,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            dir: default_downloads_dir(),
        }
    }
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("./data/downloads")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Documents longer than this are split; also the upper bound per chunk.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Extracted text shorter than this is rejected at ingestion.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            min_text_chars: default_min_text_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    8000
}
fn default_min_text_chars() -> usize {
    100
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
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
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
pub struct ArxivConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Category filter applied to every query (e.g. `cs.*`).
    #[serde(default = "default_category")]
    pub category: String,
    /// Minimum gap between two consecutive API queries.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Pause between two items of a bulk download or add loop.
    #[serde(default = "default_download_delay_ms")]
    pub download_delay_ms: u64,
    #[serde(default = "default_arxiv_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            category: default_category(),
            request_delay_ms: default_request_delay_ms(),
            download_delay_ms: default_download_delay_ms(),
            timeout_secs: default_arxiv_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "http://export.arxiv.org/api/query".to_string()
}
fn default_category() -> String {
    "cs.*".to_string()
}
fn default_request_delay_ms() -> u64 {
    3000
}
fn default_download_delay_ms() -> u64 {
    1000
}
fn default_arxiv_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Config with every section defaulted and the database under `./data`.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/shelf.sqlite"),
                collection: default_collection(),
            },
            downloads: DownloadsConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            arxiv: ArxivConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.collection.trim().is_empty() {
        anyhow::bail!("db.collection must not be empty");
    }

    // Validate chunking
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.min_text_chars > config.chunking.max_chars {
        anyhow::bail!("chunking.min_text_chars must be <= chunking.max_chars");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    Ok(config)
}
