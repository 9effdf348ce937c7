//! Session controller: one user's documents, index, and conversation.
//!
//! A [`Session`] owns the only mutable state in the pipeline: the current
//! index and the conversation history. Both are replaced by a single
//! assignment after every `.await` in an operation, so a failed or
//! cancelled upload or question leaves the session exactly as it was.
//!
//! Operations take `&mut self`, which serialises them. Callers that share a
//! session across tasks (the HTTP server) wrap it in [`SharedSession`]; an
//! `ask` then waits for an in-flight upload to finish and sees its index.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use docqa_core::chunk::{chunk_text, ChunkingParams};
use docqa_core::conversation::{Answer, ConversationEngine, RetrievalParams};
use docqa_core::embedding::EmbeddingProvider;
use docqa_core::generation::{GenerationParams, GenerationProvider};
use docqa_core::index::{IndexParams, VectorIndex};
use docqa_core::models::ConversationHistory;
use docqa_core::{Error, Result};

use crate::config::Config;
use crate::extract::{extract_documents, Document};
use crate::progress::{UploadProgressEvent, UploadProgressReporter};

/// A session shared between tasks.
pub type SharedSession = Arc<tokio::sync::Mutex<Session>>;

/// Pipeline settings for one session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub chunking: ChunkingParams,
    pub index: IndexParams,
    pub retrieval: RetrievalParams,
    pub generation: GenerationParams,
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            chunking: config.chunking_params(),
            index: config.index_params(),
            retrieval: config.retrieval_params(),
            generation: config.generation_params(),
        }
    }
}

/// What a successful upload produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub documents: usize,
    /// Characters of extracted text.
    pub characters: usize,
    pub chunks: usize,
    pub dims: usize,
}

pub struct Session {
    config: SessionConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    index: Option<Arc<VectorIndex>>,
    history: ConversationHistory,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            config,
            embedder,
            generator,
            index: None,
            history: ConversationHistory::new(),
        }
    }

    /// Wrap in a mutex for sharing between tasks.
    pub fn shared(self) -> SharedSession {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    pub fn index(&self) -> Option<Arc<VectorIndex>> {
        self.index.clone()
    }

    /// Replace the index with one built from `docs`.
    ///
    /// Runs extract → chunk → embed. On any error the previous index (or
    /// lack of one) is kept. History is not touched.
    pub async fn upload_documents(
        &mut self,
        docs: Vec<Document>,
        progress: &dyn UploadProgressReporter,
    ) -> Result<UploadSummary> {
        let started = Instant::now();
        if docs.is_empty() {
            return Err(Error::Configuration("no documents provided".to_string()));
        }
        self.config.chunking.validate()?;

        let documents = docs.len();
        let names: Vec<String> = docs.iter().map(|d| d.name.clone()).collect();
        progress.report(UploadProgressEvent::Extracting { documents });
        let text = tokio::task::spawn_blocking(move || extract_documents(&docs))
            .await
            .map_err(|e| Error::extraction(names.join(", "), e.to_string()))??;

        let characters = text.chars().count();
        progress.report(UploadProgressEvent::Chunking { characters });
        let chunks = chunk_text(&text, &self.config.chunking)?;
        if chunks.is_empty() {
            return Err(Error::extraction(
                names.join(", "),
                "no text could be extracted",
            ));
        }

        progress.report(UploadProgressEvent::Embedding {
            chunks: chunks.len(),
            model: self.embedder.model_name().to_string(),
        });
        let index = VectorIndex::build(chunks, self.embedder.as_ref(), &self.config.index).await?;

        let summary = UploadSummary {
            documents,
            characters,
            chunks: index.len(),
            dims: index.dims(),
        };
        self.index = Some(Arc::new(index));

        progress.report(UploadProgressEvent::Indexed {
            chunks: summary.chunks,
            dims: summary.dims,
        });
        tracing::info!(
            documents = summary.documents,
            characters = summary.characters,
            chunks = summary.chunks,
            dims = summary.dims,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index built"
        );
        Ok(summary)
    }

    /// Answer `question` against the current index and history.
    ///
    /// On success the turn is appended to history; on failure history is
    /// unchanged.
    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        let started = Instant::now();
        let engine = ConversationEngine::new(
            self.embedder.as_ref(),
            self.generator.as_ref(),
            self.config.retrieval,
            self.config.generation,
        );
        let answer = engine
            .answer(self.index.as_deref(), &self.history, question)
            .await?;

        self.history = answer.history.clone();
        tracing::info!(
            turns = self.history.len(),
            sources = answer.sources.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "question answered"
        );
        Ok(answer)
    }

    /// Clear the conversation. The index is kept.
    pub fn reset(&mut self) {
        self.history = ConversationHistory::new();
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::extract::DocumentFormat;
    use crate::progress::NoProgress;

    struct Hash;

    #[async_trait]
    impl EmbeddingProvider for Hash {
        fn model_name(&self) -> &str {
            "hash"
        }
        fn dims(&self) -> usize {
            8
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 8];
                    for (i, b) in t.bytes().enumerate() {
                        v[i % 8] += b as f32;
                    }
                    v
                })
                .collect())
        }
    }

    struct Echo;

    #[async_trait]
    impl GenerationProvider for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> anyhow::Result<String> {
            Ok(format!("answer #{}", prompt.matches("Human:").count() + 1))
        }
    }

    fn session() -> Session {
        Session::new(SessionConfig::default(), Arc::new(Hash), Arc::new(Echo))
    }

    fn text_doc(name: &str, text: &str) -> Document {
        Document::new(name, DocumentFormat::Text, text.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn upload_runs_on_spawned_task() {
        let shared = session().shared();
        let task = {
            let shared = shared.clone();
            tokio::spawn(async move {
                shared
                    .lock()
                    .await
                    .upload_documents(vec![text_doc("a.txt", "alpha\nbeta")], &NoProgress)
                    .await
            })
        };
        assert_eq!(task.await.unwrap().unwrap().documents, 1);
        let answer = tokio::spawn(async move { shared.lock().await.ask("alpha?").await });
        assert!(answer.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn upload_then_ask_updates_history() {
        let mut session = session();
        let summary = session
            .upload_documents(vec![text_doc("a.txt", "alpha\nbeta")], &NoProgress)
            .await
            .unwrap();
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.characters, 10);
        assert_eq!(summary.chunks, 1);
        assert_eq!(summary.dims, 8);

        let answer = session.ask("what?").await.unwrap();
        assert_eq!(answer.text, "answer #1");
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_history_keeps_index() {
        let mut session = session();
        session
            .upload_documents(vec![text_doc("a.txt", "alpha")], &NoProgress)
            .await
            .unwrap();
        session.ask("q").await.unwrap();
        session.reset();
        assert!(session.history().is_empty());
        assert!(session.has_index());
    }

    #[tokio::test]
    async fn empty_upload_rejected() {
        let mut session = session();
        let err = session
            .upload_documents(Vec::new(), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn separator_only_text_is_extraction_error() {
        let mut session = session();
        // Whitespace-only lines are still non-empty units.
        session
            .upload_documents(vec![text_doc("spaces.txt", "\n\n  ")], &NoProgress)
            .await
            .unwrap();

        let err = session
            .upload_documents(vec![text_doc("empty.txt", "\n\n")], &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extraction { ref document, .. } if document == "empty.txt"));
    }
}
