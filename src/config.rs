//! Configuration parsing and validation.
//!
//! docqa is configured with a TOML file (default `./config/docqa.toml`).
//! Every section and field has a default, so an empty file is valid and a
//! missing file at the default path means "all defaults".
//!
//! ```toml
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//! separator = "\n"
//!
//! [retrieval]
//! k = 4
//!
//! [embedding]
//! provider = "huggingface"
//! model = "sentence-transformers/all-MiniLM-L6-v2"
//!
//! [generation]
//! provider = "huggingface"
//! model = "google/flan-t5-xxl"
//! temperature = 0.5
//! max_length = 512
//! ```
//!
//! API keys are never read from the file. They come from the environment
//! (`OPENAI_API_KEY`, `HUGGINGFACEHUB_API_TOKEN`), optionally via `.env`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docqa_core::chunk::ChunkingParams;
use docqa_core::conversation::RetrievalParams;
use docqa_core::generation::GenerationParams;
use docqa_core::index::IndexParams;

/// Default location of the config file.
pub const DEFAULT_CONFIG_PATH: &str = "./config/docqa.toml";

const EMBEDDING_PROVIDERS: &[&str] = &["disabled", "openai", "ollama", "huggingface", "local"];
const GENERATION_PROVIDERS: &[&str] = &["disabled", "openai", "ollama", "huggingface"];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters carried over from the end of the previous chunk.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separator: default_separator(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_separator() -> String {
    "\n".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Chunks retrieved per question.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Rewrite follow-up questions into standalone ones before retrieval.
    #[serde(default)]
    pub condense_question: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            condense_question: false,
        }
    }
}

fn default_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Expected vector size. When unset the index learns it from the
    /// first batch.
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama host, OpenAI-compatible gateway).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Embedding batches in flight at once during an upload.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_embedding_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_retries: default_embedding_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_concurrency() -> usize {
    4
}
fn default_embedding_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum answer length in model tokens.
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    #[serde(default = "default_generation_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_length: default_max_length(),
            max_retries: default_generation_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_temperature() -> f32 {
    0.5
}
fn default_max_length() -> u32 {
    512
}
fn default_generation_max_retries() -> u32 {
    3
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Request body limit for document uploads.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Sessions held at once; creating one more is refused.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Sessions unused for this long are dropped when a new one is created.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            max_sessions: default_max_sessions(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}
fn default_max_sessions() -> usize {
    100
}
fn default_session_idle_secs() -> u64 {
    3600
}

impl Config {
    pub fn chunking_params(&self) -> ChunkingParams {
        ChunkingParams {
            chunk_size: self.chunking.chunk_size,
            chunk_overlap: self.chunking.chunk_overlap,
            separator: self.chunking.separator.clone(),
        }
    }

    pub fn index_params(&self) -> IndexParams {
        IndexParams {
            batch_size: self.embedding.batch_size,
            concurrency: self.embedding.concurrency,
        }
    }

    pub fn retrieval_params(&self) -> RetrievalParams {
        RetrievalParams {
            k: self.retrieval.k,
            condense_question: self.retrieval.condense_question,
        }
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.generation.temperature,
            max_length: self.generation.max_length,
        }
    }

    /// Check cross-field constraints. Called by [`load_config`].
    pub fn validate(&self) -> Result<()> {
        // Validate chunking
        self.chunking_params()
            .validate()
            .map_err(|e| anyhow::anyhow!("[chunking] {}", e))?;

        // Validate retrieval
        if self.retrieval.k < 1 {
            bail!("retrieval.k must be >= 1");
        }

        // Validate embedding
        if !EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            bail!(
                "Unknown embedding provider: '{}'. Must be one of: {}",
                self.embedding.provider,
                EMBEDDING_PROVIDERS.join(", ")
            );
        }
        if matches!(self.embedding.provider.as_str(), "openai" | "ollama")
            && self.embedding.model.is_none()
        {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                self.embedding.provider
            );
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0 when set");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.concurrency == 0 {
            bail!("embedding.concurrency must be > 0");
        }

        // Validate generation
        if !GENERATION_PROVIDERS.contains(&self.generation.provider.as_str()) {
            bail!(
                "Unknown generation provider: '{}'. Must be one of: {}",
                self.generation.provider,
                GENERATION_PROVIDERS.join(", ")
            );
        }
        if matches!(self.generation.provider.as_str(), "openai" | "ollama")
            && self.generation.model.is_none()
        {
            bail!(
                "generation.model must be specified when provider is '{}'",
                self.generation.provider
            );
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            bail!("generation.temperature must be in [0.0, 2.0]");
        }
        if self.generation.max_length == 0 {
            bail!("generation.max_length must be > 0");
        }

        if self.server.max_upload_bytes == 0 {
            bail!("server.max_upload_bytes must be > 0");
        }
        if self.server.max_sessions == 0 {
            bail!("server.max_sessions must be > 0");
        }
        if self.server.session_idle_secs == 0 {
            bail!("server.session_idle_secs must be > 0");
        }

        Ok(())
    }
}

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    config.validate()?;
    Ok(config)
}

/// Load `path`, falling back to defaults when the default path is absent.
///
/// An explicitly given path that does not exist is still an error.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() && path == PathBuf::from(DEFAULT_CONFIG_PATH) {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(Config::default());
    }
    load_config(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(toml: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.chunking.separator, "\n");
        assert_eq!(config.retrieval.k, 4);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.generation.temperature, 0.5);
        assert_eq!(config.generation.max_length, 512);
        assert_eq!(config.server.bind, "127.0.0.1:8501");
    }

    #[test]
    fn params_follow_config() {
        let config = parse(
            r#"
[chunking]
chunk_size = 300
chunk_overlap = 50
separator = "\n\n"

[retrieval]
k = 2
condense_question = true

[embedding]
batch_size = 8
concurrency = 2

[generation]
temperature = 0.1
max_length = 64
"#,
        )
        .unwrap();
        let chunking = config.chunking_params();
        assert_eq!(chunking.chunk_size, 300);
        assert_eq!(chunking.separator, "\n\n");
        assert_eq!(config.index_params().batch_size, 8);
        assert_eq!(config.index_params().concurrency, 2);
        assert!(config.retrieval_params().condense_question);
        assert_eq!(config.generation_params().max_length, 64);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = parse("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn chunking_rules_shared_with_chunker() {
        let err = parse("[chunking]\nchunk_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
        let err = parse("[chunking]\nseparator = \"\"\n").unwrap_err();
        assert!(err.to_string().contains("separator"));
    }

    #[test]
    fn server_session_limits() {
        let config = parse("").unwrap();
        assert_eq!(config.server.max_sessions, 100);
        assert_eq!(config.server.session_idle_secs, 3600);
        assert!(parse("[server]\nmax_sessions = 0\n").is_err());
        assert!(parse("[server]\nsession_idle_secs = 0\n").is_err());
    }

    #[test]
    fn zero_k_rejected() {
        assert!(parse("[retrieval]\nk = 0\n").is_err());
    }

    #[test]
    fn unknown_providers_rejected() {
        assert!(parse("[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[generation]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn openai_embedding_requires_model() {
        let err = parse("[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        assert!(parse("[generation]\ntemperature = 3.5\n").is_err());
    }

    #[test]
    fn load_config_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retrieval]\nk = 7").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.retrieval.k, 7);
    }

    #[test]
    fn explicit_missing_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_or_default(&dir.path().join("nope.toml")).is_err());
    }
}
