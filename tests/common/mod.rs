//! Stub providers shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docqa::session::{Session, SessionConfig};
use docqa_core::embedding::EmbeddingProvider;
use docqa_core::generation::{GenerationParams, GenerationProvider};

/// Letter-frequency vectors: deterministic, and texts sharing letters land close.
pub fn letters(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 27];
    for c in text.chars() {
        if c.is_ascii_alphabetic() {
            v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        } else {
            v[26] += 0.01;
        }
    }
    v
}

/// Embeds with [`letters`]. Can be switched to fail, or to stall before
/// answering.
#[derive(Default)]
pub struct StubEmbedder {
    pub fail: AtomicBool,
    pub delay_ms: AtomicUsize,
    pub calls: AtomicUsize,
    pub started: tokio::sync::Notify,
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-letters"
    }
    fn dims(&self) -> usize {
        27
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding service unavailable");
        }
        Ok(texts.iter().map(|t| letters(t)).collect())
    }
}

/// Records every prompt and answers "Answer N", or fails when told to.
#[derive(Default)]
pub struct StubGenerator {
    pub fail: AtomicBool,
    pub delay_ms: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl StubGenerator {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for StubGenerator {
    fn model_name(&self) -> &str {
        "stub-generator"
    }
    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> anyhow::Result<String> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("model overloaded");
        }
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());
        Ok(format!("Answer {}", prompts.len()))
    }
}

pub fn session_with(
    config: SessionConfig,
) -> (Session, Arc<StubEmbedder>, Arc<StubGenerator>) {
    let embedder = Arc::new(StubEmbedder::default());
    let generator = Arc::new(StubGenerator::default());
    let session = Session::new(config, embedder.clone(), generator.clone());
    (session, embedder, generator)
}

/// 40 lines of exactly 50 characters: "A. B. C. A. B. ..."
pub fn abc_document() -> String {
    let line: String = "A. B. C. ".repeat(6).chars().take(50).collect();
    vec![line; 40].join("\n")
}
