//! Shared test doubles: deterministic embedder and reranker fakes.
#![allow(dead_code)]

use async_trait::async_trait;
use semantic_code_mcp::embeddings::{
    EMBEDDING_DIMENSION, Embedder, Embedding, Reranker, estimate_token_count, l2_normalize,
};
use semantic_code_mcp::{Result, SearchError};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Deterministic bag-of-tokens embedder: each token lights one vector
/// bucket, so texts sharing tokens land near each other in cosine space.
pub struct FakeEmbedder;

pub fn embed_text(text: &str) -> Embedding {
    let mut vector = vec![0.0f32; EMBEDDING_DIMENSION];
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let bucket = (hasher.finish() as usize) % EMBEDDING_DIMENSION;
        vector[bucket] += 1.0;
    }
    l2_normalize(&mut vector);
    Embedding {
        vector,
        token_count: estimate_token_count(text),
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_document(&self, text: &str) -> Result<Embedding> {
        Ok(embed_text(text))
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        Ok(embed_text(text))
    }
}

/// Wraps [`FakeEmbedder`] and counts every call, for asserting that the
/// embedder is not touched on certain paths.
pub struct CountingEmbedder {
    pub calls: Arc<AtomicUsize>,
}

impl CountingEmbedder {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed_document(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(embed_text(text))
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(embed_text(text))
    }
}

/// Scores a passage by the fraction of query tokens it contains.
pub struct FakeReranker;

#[async_trait]
impl Reranker for FakeReranker {
    async fn score(&self, query: &str, passage: &str) -> Result<f32> {
        let passage = passage.to_lowercase();
        let tokens: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if tokens.is_empty() {
            return Ok(0.0);
        }
        let hits = tokens.iter().filter(|t| passage.contains(t.as_str())).count();
        Ok(hits as f32 / tokens.len() as f32)
    }
}

/// A reranker that always fails, for exercising the fallback path.
pub struct FailingReranker;

#[async_trait]
impl Reranker for FailingReranker {
    async fn score(&self, _query: &str, _passage: &str) -> Result<f32> {
        Err(SearchError::Embedding(
            "reranker is down for maintenance".to_string(),
        ))
    }
}
