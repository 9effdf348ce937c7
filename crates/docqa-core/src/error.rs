//! Error taxonomy shared by every pipeline stage.
//!
//! Each variant is terminal for the operation that raised it. Operations
//! either succeed with their documented state change applied or fail with
//! none of it applied, so callers can keep using a session after any error.

use thiserror::Error;

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A document could not be read (corrupt container, bad encoding,
    /// unsupported format). The whole upload batch is discarded.
    #[error("failed to extract text from '{document}': {message}")]
    Extraction { document: String, message: String },

    /// Invalid chunking, retrieval, or generation settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedding provider failed or returned malformed vectors.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The language model failed or returned an empty answer.
    #[error("generation failed: {0}")]
    Generation(String),

    /// A question was asked before any documents were indexed.
    #[error("no documents have been indexed yet; upload documents first")]
    NoIndex,
}

impl Error {
    pub fn extraction(document: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            document: document.into(),
            message: message.into(),
        }
    }

    /// Wrap a provider error, keeping its context chain in the message.
    pub fn embedding(err: impl std::fmt::Display) -> Self {
        Self::Embedding(format!("{:#}", err))
    }

    /// Wrap a provider error, keeping its context chain in the message.
    pub fn generation(err: impl std::fmt::Display) -> Self {
        Self::Generation(format!("{:#}", err))
    }

    /// Short machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Extraction { .. } => "extraction_failed",
            Error::Configuration(_) => "bad_request",
            Error::Embedding(_) => "embedding_failed",
            Error::Generation(_) => "generation_failed",
            Error::NoIndex => "no_index",
        }
    }
}
