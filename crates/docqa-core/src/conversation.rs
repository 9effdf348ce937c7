//! Conversation engine: retrieval plus history-conditioned generation.
//!
//! The engine is stateless. It reads an index and a history, and returns a
//! new history with the answered turn appended. The caller decides whether
//! to keep it, which is what makes a failed question leave no trace.
//!
//! # Flow
//!
//! 1. Reject empty questions and missing indexes.
//! 2. Optionally rewrite a follow-up into a standalone question (used for
//!    retrieval only).
//! 3. Retrieve the top-`k` chunks.
//! 4. Build the prompt from context, prior turns, and the question.
//! 5. Generate, reject empty output, append the turn.

use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::generation::{GenerationParams, GenerationProvider};
use crate::index::VectorIndex;
use crate::models::{ConversationHistory, ScoredChunk, Turn};
use crate::prompt::{build_answer_prompt, build_condense_prompt};

/// Retrieval settings, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalParams {
    /// Number of chunks passed to the model as context.
    pub k: usize,
    /// Rewrite follow-up questions into standalone ones before retrieval.
    pub condense_question: bool,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            k: 4,
            condense_question: false,
        }
    }
}

/// The result of one successful question.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Chunks used as context, best match first.
    pub sources: Vec<ScoredChunk>,
    /// The input history with this turn appended.
    pub history: ConversationHistory,
    /// The rewritten question used for retrieval, when condensing ran.
    pub standalone_question: Option<String>,
}

/// Answers questions against an index using injected providers.
pub struct ConversationEngine<'a> {
    embedder: &'a dyn EmbeddingProvider,
    generator: &'a dyn GenerationProvider,
    retrieval: RetrievalParams,
    generation: GenerationParams,
}

impl<'a> ConversationEngine<'a> {
    pub fn new(
        embedder: &'a dyn EmbeddingProvider,
        generator: &'a dyn GenerationProvider,
        retrieval: RetrievalParams,
        generation: GenerationParams,
    ) -> Self {
        Self {
            embedder,
            generator,
            retrieval,
            generation,
        }
    }

    /// Answer `question` given `history`, without touching `history`.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] for an empty question.
    /// - [`Error::NoIndex`] when `index` is `None`.
    /// - [`Error::Embedding`] when the question cannot be embedded.
    /// - [`Error::Generation`] when the model fails or answers with nothing.
    pub async fn answer(
        &self,
        index: Option<&VectorIndex>,
        history: &ConversationHistory,
        question: &str,
    ) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::Configuration(
                "question must not be empty".to_string(),
            ));
        }
        let index = index.ok_or(Error::NoIndex)?;

        let standalone_question = if self.retrieval.condense_question && !history.is_empty() {
            Some(self.condense(history, question).await?)
        } else {
            None
        };
        let retrieval_query = standalone_question.as_deref().unwrap_or(question);

        let sources = index
            .search(self.embedder, retrieval_query, self.retrieval.k)
            .await?;
        tracing::debug!(
            retrieved = sources.len(),
            best_distance = sources.first().map(|s| s.distance),
            "retrieved context"
        );

        let prompt = build_answer_prompt(&sources, history, question);
        let text = self.generate(&prompt).await?;

        let history = history.with_turn(Turn::new(question, text.clone()));
        Ok(Answer {
            text,
            sources,
            history,
            standalone_question,
        })
    }

    async fn condense(&self, history: &ConversationHistory, question: &str) -> Result<String> {
        let prompt = build_condense_prompt(history, question);
        let standalone = self.generate(&prompt).await?;
        tracing::debug!(standalone = %standalone, "condensed follow-up question");
        Ok(standalone)
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let raw = self
            .generator
            .generate(prompt, &self.generation)
            .await
            .map_err(Error::generation)?;
        let text = raw.trim();
        if text.is_empty() {
            return Err(Error::Generation(format!(
                "model '{}' returned an empty response",
                self.generator.model_name()
            )));
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::chunk::{chunk_text, ChunkingParams};
    use crate::index::IndexParams;

    struct Letters;

    #[async_trait]
    impl EmbeddingProvider for Letters {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.chars().filter(|c| c.is_ascii_alphabetic()) {
                        v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    /// Replies from a script and records every prompt.
    struct Scripted {
        replies: Mutex<Vec<anyhow::Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<anyhow::Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("default reply".to_string()))
        }
    }

    async fn index() -> VectorIndex {
        let text = "Alpha is the first letter.\nBeta is the second letter.\nZeta is near the end.";
        let params = ChunkingParams {
            chunk_size: 30,
            chunk_overlap: 0,
            separator: "\n".to_string(),
        };
        VectorIndex::build(
            chunk_text(text, &params).unwrap(),
            &Letters,
            &IndexParams::default(),
        )
        .await
        .unwrap()
    }

    fn engine<'a>(generator: &'a Scripted, retrieval: RetrievalParams) -> ConversationEngine<'a> {
        ConversationEngine::new(&Letters, generator, retrieval, GenerationParams::default())
    }

    #[tokio::test]
    async fn answer_appends_turn_without_mutating_input() {
        let index = index().await;
        let generator = Scripted::new(vec![Ok("  Alpha comes first.  ".to_string())]);
        let history = ConversationHistory::new();

        let answer = engine(&generator, RetrievalParams::default())
            .answer(Some(&index), &history, "What is Alpha?")
            .await
            .unwrap();

        assert_eq!(answer.text, "Alpha comes first.");
        assert!(history.is_empty());
        assert_eq!(answer.history.len(), 1);
        assert_eq!(answer.history.turns()[0].question, "What is Alpha?");
        assert_eq!(answer.sources.len(), 3);
        assert!(answer.standalone_question.is_none());
    }

    #[tokio::test]
    async fn missing_index_is_no_index_error() {
        let generator = Scripted::new(vec![]);
        let err = engine(&generator, RetrievalParams::default())
            .answer(None, &ConversationHistory::new(), "anything")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoIndex));
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn empty_question_rejected() {
        let index = index().await;
        let generator = Scripted::new(vec![]);
        let err = engine(&generator, RetrievalParams::default())
            .answer(Some(&index), &ConversationHistory::new(), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn provider_failure_is_generation_error() {
        let index = index().await;
        let generator = Scripted::new(vec![Err(anyhow::anyhow!("503 from provider"))]);
        let err = engine(&generator, RetrievalParams::default())
            .answer(Some(&index), &ConversationHistory::new(), "What is Beta?")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn blank_output_is_generation_error() {
        let index = index().await;
        let generator = Scripted::new(vec![Ok(" \n ".to_string())]);
        let err = engine(&generator, RetrievalParams::default())
            .answer(Some(&index), &ConversationHistory::new(), "What is Beta?")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[tokio::test]
    async fn k_limits_context() {
        let index = index().await;
        let generator = Scripted::new(vec![]);
        let retrieval = RetrievalParams {
            k: 1,
            condense_question: false,
        };
        let answer = engine(&generator, retrieval)
            .answer(Some(&index), &ConversationHistory::new(), "Zeta end")
            .await
            .unwrap();
        assert_eq!(answer.sources.len(), 1);
        assert!(answer.sources[0].chunk.text.starts_with("Zeta"));
    }

    #[tokio::test]
    async fn condense_runs_only_with_history() {
        let index = index().await;
        let retrieval = RetrievalParams {
            k: 2,
            condense_question: true,
        };

        let generator = Scripted::new(vec![Ok("first".to_string())]);
        let answer = engine(&generator, retrieval)
            .answer(Some(&index), &ConversationHistory::new(), "What is Alpha?")
            .await
            .unwrap();
        assert_eq!(generator.prompts().len(), 1);
        assert!(answer.standalone_question.is_none());

        let generator = Scripted::new(vec![
            Ok("What is Beta?".to_string()),
            Ok("Beta is second.".to_string()),
        ]);
        let answer = engine(&generator, retrieval)
            .answer(Some(&index), &answer.history, "And the next one?")
            .await
            .unwrap();
        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Follow Up Input: And the next one?"));
        assert!(prompts[1].contains("Question: And the next one?"));
        assert_eq!(answer.standalone_question.as_deref(), Some("What is Beta?"));
        assert_eq!(answer.text, "Beta is second.");
        assert_eq!(answer.history.len(), 2);
    }
}
