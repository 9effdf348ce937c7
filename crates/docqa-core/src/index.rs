//! In-memory vector index over embedded chunks.
//!
//! Holds every chunk next to its embedding, in chunk order. Search is
//! brute-force cosine distance over all stored vectors, which is exact and
//! fast enough for the few thousand chunks a document upload produces.
//!
//! An index is built once per upload batch and never mutated afterwards;
//! a new upload builds a new index that replaces the old one wholesale.

use std::cmp::Ordering;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_distance, embed_query, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{Chunk, ScoredChunk};

/// Embedding batch settings for [`VectorIndex::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    /// Number of chunk texts sent to the provider per call.
    pub batch_size: usize,
    /// Maximum number of batches in flight at once.
    pub concurrency: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            batch_size: 64,
            concurrency: 4,
        }
    }
}

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Immutable nearest-neighbour index.
pub struct VectorIndex {
    model: String,
    dims: usize,
    entries: Vec<Entry>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("model", &self.model)
            .field("dims", &self.dims)
            .field("len", &self.entries.len())
            .finish()
    }
}

impl VectorIndex {
    /// Embed `chunks` and build an index over them.
    ///
    /// Batches may be embedded concurrently, but results are reassembled in
    /// chunk order, so insertion order (and therefore tie-breaking) never
    /// depends on which batch finished first.
    ///
    /// # Errors
    ///
    /// [`Error::Embedding`] when there is nothing to index, the provider
    /// fails, or it returns the wrong number of vectors, empty vectors,
    /// vectors of differing dimensions, or non-finite values. Nothing is
    /// returned on failure.
    pub async fn build(
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
        params: &IndexParams,
    ) -> Result<Self> {
        if params.batch_size == 0 || params.concurrency == 0 {
            return Err(Error::Configuration(
                "embedding batch_size and concurrency must be greater than 0".to_string(),
            ));
        }
        if chunks.is_empty() {
            return Err(Error::Embedding("nothing to index: no chunks".to_string()));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        // Owned batches keep the per-batch futures `Send` for spawned callers.
        let batches: Vec<Vec<String>> = texts
            .chunks(params.batch_size)
            .map(<[String]>::to_vec)
            .collect();

        let batches: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| async move {
                let vectors = provider.embed(&batch).await.map_err(Error::embedding)?;
                if vectors.len() != batch.len() {
                    return Err(Error::Embedding(format!(
                        "provider returned {} vectors for {} texts",
                        vectors.len(),
                        batch.len()
                    )));
                }
                Ok(vectors)
            })
            .buffered(params.concurrency)
            .try_collect()
            .await?;

        let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
        let dims = validate_vectors(&vectors, provider.dims())?;

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| Entry { chunk, vector })
            .collect::<Vec<_>>();

        tracing::info!(
            model = provider.model_name(),
            dims,
            chunks = entries.len(),
            "built vector index"
        );

        Ok(Self {
            model: provider.model_name().to_string(),
            dims,
            entries,
        })
    }

    /// Return the `k` chunks closest to `query_vec`, best match first.
    ///
    /// Ordered ascending by cosine distance; equal distances keep insertion
    /// order.
    ///
    /// # Errors
    ///
    /// [`Error::Embedding`] when `query_vec` has the wrong dimension or
    /// contains non-finite values.
    pub fn query(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query_vec.len() != self.dims {
            return Err(Error::Embedding(format!(
                "query vector has {} dimensions, index has {}",
                query_vec.len(),
                self.dims
            )));
        }
        if query_vec.iter().any(|x| !x.is_finite()) {
            return Err(Error::Embedding("query vector contains non-finite values".to_string()));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_distance(query_vec, &e.vector)))
            .collect();

        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, distance)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                distance,
            })
            .collect())
    }

    /// Embed `text` with `provider` and [`query`](Self::query) with it.
    pub async fn search(
        &self,
        provider: &dyn EmbeddingProvider,
        text: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let query_vec = embed_query(provider, text)
            .await
            .map_err(Error::embedding)?;
        self.query(&query_vec, k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Name of the embedding model the index was built with.
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Indexed chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// The stored embedding of the chunk at `index`.
    pub fn vector(&self, index: usize) -> Option<&[f32]> {
        self.entries.get(index).map(|e| e.vector.as_slice())
    }
}

/// Check that every vector is non-empty, finite, and of one dimension.
/// Returns that dimension.
fn validate_vectors(vectors: &[Vec<f32>], reported_dims: usize) -> Result<usize> {
    let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
    if dims == 0 {
        return Err(Error::Embedding("provider returned empty vectors".to_string()));
    }
    if reported_dims != 0 && reported_dims != dims {
        return Err(Error::Embedding(format!(
            "provider declares {} dimensions but returned {}",
            reported_dims, dims
        )));
    }
    for (i, v) in vectors.iter().enumerate() {
        if v.len() != dims {
            return Err(Error::Embedding(format!(
                "vector {} has {} dimensions, expected {}",
                i,
                v.len(),
                dims
            )));
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(Error::Embedding(format!("vector {} contains non-finite values", i)));
        }
    }
    Ok(dims)
}
