//! In-memory vector index over one upload's chunks.
//!
//! Built once from every chunk of a batch and never modified afterwards.
//! Search is brute-force cosine similarity; equal scores keep insertion
//! order, so the earlier chunk wins a tie.

use tracing::debug;

use crate::embedding::{cosine_similarity, embed_in_batches, EmbeddingProvider};
use crate::error::QaError;
use crate::models::{Chunk, SourceChunk};

struct IndexedChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

pub struct VectorIndex {
    entries: Vec<IndexedChunk>,
    dims: usize,
    model: String,
}

/// A search hit borrowed from the index.
#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

impl ScoredChunk<'_> {
    pub fn to_source(&self) -> SourceChunk {
        SourceChunk {
            chunk_index: self.chunk.chunk_index,
            score: self.score,
            text: self.chunk.text.clone(),
        }
    }
}

impl VectorIndex {
    /// Embeds every chunk and builds the index.
    ///
    /// Fails with [`QaError::EmptyInput`] when `chunks` is empty.
    pub async fn build(
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self, QaError> {
        if chunks.is_empty() {
            return Err(QaError::EmptyInput);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_in_batches(provider, &texts, batch_size).await?;
        let index = Self::from_vectors(chunks, vectors, provider.model_name())?;
        debug!(chunks = index.len(), dims = index.dims, "vector index built");
        Ok(index)
    }

    /// Builds an index from precomputed vectors, one per chunk.
    pub fn from_vectors(
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
        model: &str,
    ) -> Result<Self, QaError> {
        if chunks.is_empty() {
            return Err(QaError::EmptyInput);
        }
        if chunks.len() != vectors.len() {
            return Err(QaError::Embedding(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            )));
        }

        let dims = vectors[0].len();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(QaError::Embedding(format!(
                "embedding dimension {} != {}",
                bad.len(),
                dims
            )));
        }

        Ok(Self {
            entries: chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexedChunk { chunk, vector })
                .collect(),
            dims,
            model: model.to_string(),
        })
    }

    /// The `k` chunks most similar to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk<'_>> {
        let mut scored: Vec<ScoredChunk<'_>> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: &entry.chunk,
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();

        // Stable sort: ties stay in insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
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

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}
