//! Hybrid search orchestrator.
//!
//! A query flows through vector recall over an over-fetched candidate set,
//! lexical keyword boosting, and optional cross-encoder reranking. The first
//! search against an empty store triggers one shared full index build.

#[cfg(test)]
mod tests;

use futures::future::join_all;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chunker::Chunk;
use crate::embeddings::{Embedder, Reranker};
use crate::indexer::Indexer;
use crate::store::{SearchFilter, VectorStore};
use crate::{Result, SearchError};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 50;
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 5;
pub const MAX_CANDIDATE_MULTIPLIER: usize = 20;
/// Passages are clipped to this many characters before reranking.
const RERANK_PASSAGE_CHARS: usize = 512;

const CONTENT_BOOST: f32 = 0.10;
const NAME_BOOST: f32 = 0.20;
const SIGNATURE_BOOST: f32 = 0.15;
const NAME_TOKEN_BOOST: f32 = 0.25;

/// Parameters of one search call.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    pub path: Option<String>,
    pub file_pattern: Option<String>,
    pub use_reranking: bool,
    pub candidate_multiplier: usize,
}

impl Default for SearchRequest {
    #[inline]
    fn default() -> Self {
        Self {
            query: String::new(),
            limit: DEFAULT_LIMIT,
            path: None,
            file_pattern: None,
            use_reranking: true,
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
        }
    }
}

/// One ranked result row.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Final ranking score in `[0, 1]`.
    pub combined_score: f32,
    /// Cosine similarity before boosting.
    pub vector_score: f32,
    /// Lexical contribution: post-boost score minus the vector score.
    pub keyword_score: f32,
}

pub struct SearchEngine {
    store: Arc<Mutex<VectorStore>>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    indexer: Arc<Indexer>,
    root: PathBuf,
    build_lock: Mutex<()>,
}

impl SearchEngine {
    #[inline]
    pub fn new(
        store: Arc<Mutex<VectorStore>>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        indexer: Arc<Indexer>,
    ) -> Self {
        let root = indexer.root().to_path_buf();
        Self {
            store,
            embedder,
            reranker,
            indexer,
            root,
            build_lock: Mutex::new(()),
        }
    }

    /// Run one search: recall, boost, optionally rerank, top-`limit`.
    #[inline]
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        self.ensure_indexed().await?;

        if self.store.lock().await.is_empty().await? {
            info!("index is empty, returning no results");
            return Ok(Vec::new());
        }

        let limit = request.limit.clamp(1, MAX_LIMIT);
        let multiplier = request.candidate_multiplier.clamp(1, MAX_CANDIDATE_MULTIPLIER);
        let reranking = request.use_reranking && self.reranker.is_some();
        let recall = if reranking { limit * multiplier } else { limit };

        let scope = match request.path.as_deref() {
            Some(path) if !path.is_empty() => Some(
                resolve_scope(&self.root, path)?
                    .to_string_lossy()
                    .to_string(),
            ),
            _ => None,
        };
        let filter = SearchFilter::new(scope, request.file_pattern.clone()).build()?;

        let query_embedding = self.embedder.embed_query(&request.query).await?;

        let candidates = self
            .store
            .lock()
            .await
            .vector_search(&query_embedding.vector, recall, filter.as_deref())
            .await?;
        debug!(
            "vector recall returned {} candidates for limit {limit}",
            candidates.len()
        );

        let keywords = tokenize(&request.query);
        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .map(|candidate| {
                let boost = keyword_boost(&candidate.chunk, &keywords);
                let combined = (candidate.score + boost).clamp(0.0, 1.0);
                SearchHit {
                    combined_score: combined,
                    vector_score: candidate.score,
                    keyword_score: combined - candidate.score,
                    chunk: candidate.chunk,
                }
            })
            .collect();

        if let Some(reranker) = self.reranker.as_deref() {
            if request.use_reranking && hits.len() > limit {
                let settled = join_all(hits.iter().map(|hit| {
                    let passage = truncate_passage(&hit.chunk.content);
                    reranker.score(&request.query, passage)
                }))
                .await;

                match settled.into_iter().collect::<Result<Vec<f32>>>() {
                    Ok(scores) => {
                        for (hit, score) in hits.iter_mut().zip(scores) {
                            hit.combined_score = score.clamp(0.0, 1.0);
                        }
                    }
                    // Boosted scores already rank reasonably; degrade quietly.
                    Err(e) => warn!("reranking failed, keeping boosted scores: {e}"),
                }
            }
        }

        hits.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Build the index on first use. Concurrent searches that arrive during
    /// the build all wait on the same lock; only one build runs.
    async fn ensure_indexed(&self) -> Result<()> {
        if !self.store.lock().await.is_empty().await? {
            return Ok(());
        }

        let _guard = self.build_lock.lock().await;
        // Another task may have finished the build while we waited.
        if !self.store.lock().await.is_empty().await? {
            return Ok(());
        }

        info!("index is empty, running initial build");
        let stats = self.indexer.index_repository(&self.store).await?;
        info!(
            "initial build indexed {} files ({} chunks)",
            stats.indexed_files, stats.total_chunks
        );
        Ok(())
    }
}

/// Absolutize a user path against the root and require it to stay inside.
fn resolve_scope(root: &Path, path: &str) -> Result<PathBuf> {
    let candidate = Path::new(path);
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let normalized = lexical_normalize(&absolute);
    if normalized.starts_with(root) {
        Ok(normalized)
    } else {
        Err(SearchError::PathTraversal(path.to_string()))
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            other => result.push(other),
        }
    }
    result
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lexical boost: exact symbol matches count most, then substring presence
/// in name, signature, and content.
fn keyword_boost(chunk: &Chunk, keywords: &[String]) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }

    let content = chunk.content.to_lowercase();
    let name = chunk.name.as_deref().unwrap_or_default().to_lowercase();
    let signature = chunk
        .signature
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    let name_tokens: HashSet<String> = tokenize(&name).into_iter().collect();

    let mut boost = 0.0;
    for keyword in keywords {
        if content.contains(keyword.as_str()) {
            boost += CONTENT_BOOST;
        }
        if !name.is_empty() && name.contains(keyword.as_str()) {
            boost += NAME_BOOST;
        }
        if !signature.is_empty() && signature.contains(keyword.as_str()) {
            boost += SIGNATURE_BOOST;
        }
        if name_tokens.contains(keyword) {
            boost += NAME_TOKEN_BOOST;
        }
    }
    boost
}

fn truncate_passage(content: &str) -> &str {
    if content.len() <= RERANK_PASSAGE_CHARS {
        return content;
    }
    let mut end = RERANK_PASSAGE_CHARS;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}
