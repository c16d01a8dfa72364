//! Embedding and reranking capabilities.
//!
//! The core never talks to a model runtime directly; it receives [`Embedder`]
//! and [`Reranker`] handles at construction. The production implementations
//! ([`ollama::OllamaClient`], [`reranker::HttpReranker`]) are wired up by the
//! CLI, and tests substitute deterministic fakes.

pub mod ollama;
pub mod reranker;


pub use ollama::OllamaClient;
pub use reranker::HttpReranker;

use crate::{Result, SearchError};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

/// Dimensionality of every stored vector.
pub const EMBEDDING_DIMENSION: usize = 768;
/// Instruction prefix for document embeddings.
pub const DOCUMENT_PREFIX: &str = "search_document: ";
/// Instruction prefix for query embeddings.
pub const QUERY_PREFIX: &str = "search_query: ";
/// Inputs are truncated to roughly this many characters before embedding.
pub const MAX_EMBED_CHARS: usize = 4 * 8192;
/// Items dispatched concurrently within one embedding batch.
pub const BATCH_SIZE: usize = 32;

/// One embedding with its estimated token count.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub token_count: usize,
}

/// Result of embedding a batch: one vector per input, in order. Items that
/// failed carry a zero vector and are listed in `failed_indices`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub embeddings: Vec<Embedding>,
    pub failed_indices: Vec<usize>,
}

/// Capability for turning text into dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_document(&self, text: &str) -> Result<Embedding>;

    async fn embed_query(&self, text: &str) -> Result<Embedding>;

    /// Embed many documents. Items within a batch of [`BATCH_SIZE`] are
    /// dispatched concurrently and settled independently; a failed item
    /// degrades to a zero vector instead of cancelling its siblings.
    async fn embed_batch(&self, texts: &[String]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for batch_start in (0..texts.len()).step_by(BATCH_SIZE) {
            let batch = &texts[batch_start..(batch_start + BATCH_SIZE).min(texts.len())];
            let settled = join_all(batch.iter().map(|text| self.embed_document(text))).await;

            for (offset, result) in settled.into_iter().enumerate() {
                match result {
                    Ok(embedding) => outcome.embeddings.push(embedding),
                    Err(e) => {
                        warn!("embedding item {} failed: {e}", batch_start + offset);
                        outcome.failed_indices.push(batch_start + offset);
                        outcome.embeddings.push(Embedding {
                            vector: zero_vector(),
                            token_count: 0,
                        });
                    }
                }
            }
        }

        Ok(outcome)
    }
}

/// Capability for cross-encoder relevance scoring of `(query, passage)`.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Relevance probability in `[0, 1]`. The caller truncates `passage`.
    async fn score(&self, query: &str, passage: &str) -> Result<f32>;
}

/// Placeholder vector for failed embeddings; ranks as irrelevant.
#[inline]
pub fn zero_vector() -> Vec<f32> {
    vec![0.0; EMBEDDING_DIMENSION]
}

/// Normalize in place to unit length. A zero vector is left untouched.
#[inline]
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Reject vectors of the wrong length or with non-finite components.
#[inline]
pub fn validate_vector(vector: &[f32]) -> Result<()> {
    if vector.len() != EMBEDDING_DIMENSION {
        return Err(SearchError::Embedding(format!(
            "vector has {} components, expected {EMBEDDING_DIMENSION}",
            vector.len()
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(SearchError::Embedding(
            "vector contains a non-finite component".to_string(),
        ));
    }
    Ok(())
}

/// Clip the input to [`MAX_EMBED_CHARS`] on a character boundary.
#[inline]
pub fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Rough token estimate (~4 characters per token).
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    text.len().div_ceil(4)
}
