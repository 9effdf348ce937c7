//! Language model provider implementations.
//!
//! Concrete backends for [`docqa_core::generation::GenerationProvider`]:
//! - **[`DisabledGenerator`]**: returns errors; used when generation is not configured.
//! - **[`OpenAIGenerator`]**: OpenAI (or compatible) `/chat/completions`.
//! - **[`OllamaGenerator`]**: local Ollama `/api/generate`.
//! - **[`HuggingFaceGenerator`]**: Hugging Face inference text generation,
//!   defaulting to `google/flan-t5-xxl`.
//!
//! Use [`create_generator`] to pick one from configuration.

use anyhow::{bail, Result};
use async_trait::async_trait;

pub use docqa_core::generation::{GenerationParams, GenerationProvider};

use crate::config::GenerationConfig;
use crate::embedding::{
    huggingface_token, openai_key, HUGGINGFACE_DEFAULT_URL, OLLAMA_DEFAULT_URL, OPENAI_DEFAULT_URL,
};
use crate::http;

pub const HUGGINGFACE_DEFAULT_GENERATION_MODEL: &str = "google/flan-t5-xxl";

/// Generator used when `generation.provider = "disabled"`.
pub struct DisabledGenerator;

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
        bail!("Generation provider is disabled; set [generation] provider in the config file")
    }
}

/// Chat-completions generator. Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    client: reqwest::Client,
    model: String,
    url: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Self::with_api_key(config, openai_key()?)
    }

    pub fn with_api_key(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model,
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
impl GenerationProvider for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": params.temperature,
            "max_tokens": params.max_length,
        });
        let json = http::post_json(
            &self.client,
            "OpenAI",
            &format!("{}/chat/completions", self.url.trim_end_matches('/')),
            Some(&self.api_key),
            &body,
            self.max_retries,
        )
        .await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content")
            })
    }
}

/// Generator backed by a local Ollama instance.
pub struct OllamaGenerator {
    client: reqwest::Client,
    model: String,
    url: String,
    max_retries: u32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string()),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": params.temperature,
                "num_predict": params.max_length,
            },
        });
        let json = http::post_json(
            &self.client,
            "Ollama",
            &format!("{}/api/generate", self.url.trim_end_matches('/')),
            None,
            &body,
            self.max_retries,
        )
        .await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response"))
    }
}

/// Hugging Face hosted inference. Requires `HUGGINGFACEHUB_API_TOKEN`.
pub struct HuggingFaceGenerator {
    client: reqwest::Client,
    model: String,
    url: String,
    token: String,
    max_retries: u32,
}

impl HuggingFaceGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Self::with_token(config, huggingface_token()?)
    }

    pub fn with_token(config: &GenerationConfig, token: String) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| HUGGINGFACE_DEFAULT_GENERATION_MODEL.to_string()),
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
impl GenerationProvider for HuggingFaceGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = serde_json::json!({
            "inputs": prompt,
            "parameters": {
                "temperature": params.temperature,
                "max_length": params.max_length,
            },
            "options": { "wait_for_model": true },
        });
        let json = http::post_json(
            &self.client,
            "Hugging Face",
            &format!("{}/models/{}", self.url.trim_end_matches('/'), self.model),
            Some(&self.token),
            &body,
            self.max_retries,
        )
        .await?;
        parse_generated_text(&json)
    }
}

/// Accepts `[{"generated_text": ..}]` or `{"generated_text": ..}`.
fn parse_generated_text(json: &serde_json::Value) -> Result<String> {
    if let Some(message) = json.get("error").and_then(|e| e.as_str()) {
        bail!("Hugging Face API error: {}", message);
    }
    let item = json
        .as_array()
        .and_then(|items| items.first())
        .unwrap_or(json);
    item.get("generated_text")
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid Hugging Face response: missing generated_text"))
}

/// Create the appropriate [`GenerationProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledGenerator`] |
/// | `"openai"` | [`OpenAIGenerator`] |
/// | `"ollama"` | [`OllamaGenerator`] |
/// | `"huggingface"` | [`HuggingFaceGenerator`] |
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "openai" => Ok(Box::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        "huggingface" => Ok(Box::new(HuggingFaceGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
