use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Statute code prefixed to every chunk ID (e.g. `ca2013`).
    pub statute_code: String,
    /// Root of the raw document tree scanned by `stx ingest`.
    pub root: PathBuf,
    /// Zero-pad width for canonical section numbers.
    #[serde(default = "default_section_width")]
    pub section_width: usize,
    /// Section of the primary Act holding the definitions.
    #[serde(default = "default_definitions_section")]
    pub definitions_section: String,
}

fn default_section_width() -> usize {
    3
}
fn default_definitions_section() -> String {
    "2".to_string()
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
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
        }
    }
}

fn default_min_confidence() -> f64 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the paired index artifacts
    /// (`vectors.bin` + `metadata.json`).
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_service_url")]
    pub url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Embeddings are fast; keep this short.
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            model: default_embedding_model(),
            dims: default_dims(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout(),
        }
    }
}

fn default_service_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "qwen3-embedding:0.6b".to_string()
}
fn default_dims() -> usize {
    1024
}
fn default_max_retries() -> u32 {
    3
}
fn default_embed_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_service_url")]
    pub url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Generation is the slow call; bounded but generous.
    #[serde(default = "default_gen_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            model: default_generation_model(),
            timeout_secs: default_gen_timeout(),
            num_predict: default_num_predict(),
            temperature: default_temperature(),
        }
    }
}

fn default_generation_model() -> String {
    "qwen2.5:1.5b".to_string()
}
fn default_gen_timeout() -> u64 {
    45
}
fn default_num_predict() -> u32 {
    768
}
fn default_temperature() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Similarity floor; results below this are excluded, not down-ranked.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
        }
    }
}

fn default_top_k() -> usize {
    15
}
fn default_min_similarity() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    4
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }
    if !(0.0..=1.0).contains(&config.extraction.min_confidence) {
        anyhow::bail!("extraction.min_confidence must be in [0.0, 1.0]");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_similarity) {
        anyhow::bail!("retrieval.min_similarity must be in [0.0, 1.0]");
    }
    if config.ingest.workers == 0 {
        anyhow::bail!("ingest.workers must be >= 1");
    }
    if config.corpus.section_width == 0 {
        anyhow::bail!("corpus.section_width must be >= 1");
    }

    Ok(config)
}
