//! Language model provider trait.
//!
//! The conversation engine never generates text itself; it hands a fully
//! built prompt to a [`GenerationProvider`]. Concrete providers live in the
//! `docqa` app crate and are selected by configuration.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sampling settings passed with every generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    /// Maximum length of the generated answer, in model tokens.
    pub max_length: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            max_length: 512,
        }
    }
}

/// Trait for answer generation backends.
///
/// Treated as a black box: any error, including retries exhausted inside
/// the provider, surfaces as a generation failure for the current question.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"google/flan-t5-xxl"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
}
