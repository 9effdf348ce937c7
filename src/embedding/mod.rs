//! Embedding provider implementations.
//!
//! Concrete backends for [`docqa_core::embedding::EmbeddingProvider`]:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls the OpenAI (or compatible) `/embeddings` API.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`HuggingFaceProvider`]**: calls the Hugging Face inference feature-extraction pipeline.
//! - **`LocalProvider`**: runs models locally via fastembed (cargo feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! # Provider Selection
//!
//! Use [`create_provider`] to instantiate the appropriate provider based
//! on the configuration:
//!
//! ```rust,no_run
//! # use docqa::config::EmbeddingConfig;
//! # use docqa::embedding::create_provider;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```
//!
//! Remote providers retry transient failures, see [`crate::http`].

use anyhow::{bail, Result};
use async_trait::async_trait;

pub use docqa_core::embedding::EmbeddingProvider;

use crate::config::EmbeddingConfig;
use crate::http::{self, json_to_vec};

pub const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
pub const HUGGINGFACE_DEFAULT_URL: &str = "https://api-inference.huggingface.co";
pub const HUGGINGFACE_DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Read the Hugging Face token from the environment.
pub(crate) fn huggingface_token() -> Result<String> {
    std::env::var("HUGGINGFACEHUB_API_TOKEN")
        .map_err(|_| anyhow::anyhow!("HUGGINGFACEHUB_API_TOKEN environment variable not set"))
}

pub(crate) fn openai_key() -> Result<String> {
    std::env::var("OPENAI_API_KEY")
        .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled; set [embedding] provider in the config file")
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST {url}/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` is not set in config, or if
    /// `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Self::with_api_key(config, openai_key()?)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model,
            dims: config.dims.unwrap_or(0),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string()),
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(
            &self.client,
            "OpenAI",
            &format!("{}/embeddings", self.url.trim_end_matches('/')),
            Some(&self.api_key),
            &body,
            self.max_retries,
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays and orders them by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(json_to_vec)
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, embedding));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured Ollama URL (default: `http://localhost:11434`).
/// Requires Ollama to be running with an embedding model pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model,
            dims: config.dims.unwrap_or(0),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string()),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(
            &self.client,
            "Ollama",
            &format!("{}/api/embed", self.url.trim_end_matches('/')),
            None,
            &body,
            self.max_retries,
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            json_to_vec(e)
                .ok_or_else(|| {
                    anyhow::anyhow!("Invalid Ollama response: embedding is not an array")
                })
        })
        .collect()
}

// ============ Hugging Face Provider ============

/// Embedding provider using the Hugging Face inference API.
///
/// Calls `POST {url}/pipeline/feature-extraction/{model}`. Requires the
/// `HUGGINGFACEHUB_API_TOKEN` environment variable. Models that return
/// per-token vectors are mean-pooled into one vector per text.
pub struct HuggingFaceProvider {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    token: String,
    max_retries: u32,
}

impl HuggingFaceProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Self::with_token(config, huggingface_token()?)
    }

    pub fn with_token(config: &EmbeddingConfig, token: String) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| HUGGINGFACE_DEFAULT_EMBEDDING_MODEL.to_string()),
            dims: config.dims.unwrap_or(0),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| HUGGINGFACE_DEFAULT_URL.to_string()),
            token,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "inputs": texts,
            "options": { "wait_for_model": true },
        });
        let json = http::post_json(
            &self.client,
            "Hugging Face",
            &format!(
                "{}/pipeline/feature-extraction/{}",
                self.url.trim_end_matches('/'),
                self.model
            ),
            Some(&self.token),
            &body,
            self.max_retries,
        )
        .await?;
        parse_feature_extraction(&json)
    }
}

/// Parse a feature-extraction response: `[[f32]]` or per-token `[[[f32]]]`.
fn parse_feature_extraction(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    if let Some(message) = json.get("error").and_then(|e| e.as_str()) {
        bail!("Hugging Face API error: {}", message);
    }
    let items = json
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid Hugging Face response: expected an array"))?;

    items
        .iter()
        .map(|item| {
            if let Some(vector) = json_to_vec(item) {
                return Ok(vector);
            }
            let tokens = item
                .as_array()
                .map(|rows| rows.iter().map(json_to_vec).collect::<Option<Vec<_>>>())
                .unwrap_or_default()
                .ok_or_else(|| anyhow::anyhow!("Invalid Hugging Face response: bad embedding"))?;
            mean_pool(&tokens)
        })
        .collect()
}

fn mean_pool(tokens: &[Vec<f32>]) -> Result<Vec<f32>> {
    let first = tokens
        .first()
        .ok_or_else(|| anyhow::anyhow!("Invalid Hugging Face response: no token vectors"))?;
    let mut sum = vec![0.0f32; first.len()];
    for token in tokens {
        if token.len() != sum.len() {
            bail!("Invalid Hugging Face response: ragged token vectors");
        }
        for (acc, v) in sum.iter_mut().zip(token) {
            *acc += v;
        }
    }
    let n = tokens.len() as f32;
    Ok(sum.into_iter().map(|v| v / n).collect())
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local inference with fastembed.
///
/// The model is downloaded on first use from Hugging Face, cached, and kept
/// loaded for the life of the provider. After the download no network
/// calls are made.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: std::sync::Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        // Fail on unknown names at startup rather than on first upload.
        config_to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
            "bge-large-en-v1.5" => 1024,
            _ => 384,
        });
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: Default::default(),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let fastembed_model = config_to_fastembed_model(&self.model_name)?;
        let batch_size = self.batch_size;
        let texts = texts.to_vec();
        let slot = self.model.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow::anyhow!("Local embedding model lock poisoned"))?;
            if guard.is_none() {
                let model = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
                )
                .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("Local embedding model not loaded"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// # Supported Providers
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"huggingface"` | [`HuggingFaceProvider`] |
/// | `"local"` | `LocalProvider` (requires `local-embeddings-fastembed`) |
///
/// # Errors
///
/// Returns an error for unknown provider names or if the provider
/// cannot be initialized (missing config, API key, or feature flag).
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        "huggingface" => Ok(Box::new(HuggingFaceProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires building with --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_is_default() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.model_name(), "disabled");
        assert_eq!(provider.dims(), 0);
    }

    #[tokio::test]
    async fn disabled_provider_errors() {
        let err = DisabledProvider
            .embed(&["x".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "magic".to_string(),
            ..Default::default()
        };
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn ollama_requires_model() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            ..Default::default()
        };
        assert!(OllamaProvider::new(&config).is_err());
    }

    #[test]
    fn huggingface_defaults_to_minilm() {
        let provider =
            HuggingFaceProvider::with_token(&EmbeddingConfig::default(), "t".to_string()).unwrap();
        assert_eq!(provider.model_name(), "sentence-transformers/all-MiniLM-L6-v2");
    }

    #[test]
    fn openai_response_sorted_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        assert_eq!(
            parse_openai_response(&json).unwrap(),
            vec![vec![1.0, 0.0], vec![0.0, 1.0]]
        );
    }

    #[test]
    fn openai_response_missing_data_is_error() {
        assert!(parse_openai_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn ollama_response_parsed() {
        let json = serde_json::json!({ "embeddings": [[0.5, 0.25]] });
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![vec![0.5, 0.25]]);
    }

    #[test]
    fn feature_extraction_pooled_and_plain() {
        let plain = serde_json::json!([[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(
            parse_feature_extraction(&plain).unwrap(),
            vec![vec![1.0, 2.0], vec![3.0, 4.0]]
        );

        let per_token = serde_json::json!([[[1.0, 0.0], [3.0, 2.0]]]);
        assert_eq!(
            parse_feature_extraction(&per_token).unwrap(),
            vec![vec![2.0, 1.0]]
        );
    }

    #[test]
    fn feature_extraction_error_body() {
        let json = serde_json::json!({ "error": "Model is loading" });
        let err = parse_feature_extraction(&json).unwrap_err();
        assert!(err.to_string().contains("Model is loading"));
    }
}
