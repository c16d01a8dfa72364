//! Repository indexer with content-hash change detection.
//!
//! Walks the root for supported source files, re-embeds only files whose MD5
//! changed since the last run, and streams records to the store under a
//! bounded memory envelope. Stale records are deleted before any flush that
//! could carry their replacements.


use anyhow::anyhow;
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunker;
use crate::chunker::Language;
use crate::config::IndexingConfig;
use crate::embeddings::Embedder;
use crate::store::{ChunkRecord, VectorStore};
use crate::{Result, SearchError};

/// Outcome of one full indexing run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexStats {
    pub total_files: usize,
    pub indexed_files: usize,
    pub skipped_files: usize,
    pub total_chunks: usize,
    pub duration_ms: u64,
}

/// Progress snapshot passed to the optional callback.
#[derive(Debug, Clone, Copy)]
pub struct IndexProgress {
    pub processed: usize,
    pub total: usize,
}

pub type ProgressFn = Box<dyn Fn(IndexProgress) + Send + Sync>;

enum FileOutcome {
    Indexed(usize),
    Unchanged,
    Skipped,
}

pub struct Indexer {
    root: PathBuf,
    embedder: Arc<dyn Embedder>,
    ignore: GlobSet,
    pruned_dirs: HashSet<String>,
    max_file_size: u64,
    file_batch_size: usize,
    max_chunks_in_memory: usize,
    progress: Option<ProgressFn>,
}

impl Indexer {
    #[inline]
    pub fn new(
        root: PathBuf,
        embedder: Arc<dyn Embedder>,
        indexing: &IndexingConfig,
    ) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &indexing.ignore {
            let glob = Glob::new(pattern).map_err(|e| {
                SearchError::Config(format!("invalid ignore pattern {pattern}: {e}"))
            })?;
            builder.add(glob);
        }
        let ignore = builder
            .build()
            .map_err(|e| SearchError::Config(format!("failed to compile ignore set: {e}")))?;

        Ok(Self {
            root,
            embedder,
            ignore,
            pruned_dirs: pruned_dir_names(&indexing.ignore),
            max_file_size: indexing.max_file_size,
            file_batch_size: indexing.file_batch_size,
            max_chunks_in_memory: indexing.max_chunks_in_memory,
            progress: None,
        })
    }

    #[inline]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the watcher and scanner should consider this path at all.
    #[inline]
    pub fn is_indexable(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        if Language::from_extension(ext).is_none() {
            return false;
        }
        let in_pruned_dir = path.components().any(|component| {
            matches!(component, Component::Normal(name)
                if self.pruned_dirs.contains(name.to_string_lossy().as_ref()))
        });
        if in_pruned_dir {
            return false;
        }
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        !self.ignore.is_match(relative) && !self.ignore.is_match(path)
    }

    /// Full scan of the root. Unchanged files are left alone; changed files
    /// have their stale records deleted before the flush that carries the
    /// replacements.
    #[inline]
    pub async fn index_repository(&self, store: &Mutex<VectorStore>) -> Result<IndexStats> {
        let started = Instant::now();

        let root = self.root.clone();
        let ignore = self.ignore.clone();
        let pruned = self.pruned_dirs.clone();
        let files = tokio::task::spawn_blocking(move || scan_repository(&root, &ignore, &pruned))
            .await
            .map_err(|e| SearchError::Other(anyhow!("scan task failed: {e}")))?;

        info!("scan found {} candidate files under {}", files.len(), self.root.display());

        let snapshot = store.lock().await.get_indexed_files().await?;

        let mut stats = IndexStats {
            total_files: files.len(),
            ..IndexStats::default()
        };
        let mut pending: Vec<ChunkRecord> = Vec::new();
        let mut stale: Vec<String> = Vec::new();
        let mut processed = 0usize;

        for batch in files.chunks(self.file_batch_size) {
            for path in batch {
                processed += 1;
                if let Some(progress) = &self.progress {
                    progress(IndexProgress {
                        processed,
                        total: files.len(),
                    });
                }

                match self
                    .process_file(path, &snapshot, &mut pending, &mut stale)
                    .await?
                {
                    FileOutcome::Indexed(chunks) => {
                        stats.indexed_files += 1;
                        stats.total_chunks += chunks;
                    }
                    FileOutcome::Unchanged => {}
                    FileOutcome::Skipped => stats.skipped_files += 1,
                }

                if pending.len() >= self.max_chunks_in_memory {
                    flush(store, &mut stale, &mut pending).await?;
                }
            }
        }

        flush(store, &mut stale, &mut pending).await?;

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "indexing finished: {} indexed, {} skipped, {} chunks, {} ms",
            stats.indexed_files, stats.skipped_files, stats.total_chunks, stats.duration_ms
        );
        Ok(stats)
    }

    /// Re-index a single file after a filesystem event. The event already
    /// implies change, so there is no hash-equality shortcut.
    #[inline]
    pub async fn index_file(&self, store: &Mutex<VectorStore>, path: &Path) -> Result<usize> {
        let path_str = path.to_string_lossy().to_string();
        store.lock().await.delete_by_file_path(&path_str).await?;

        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() == 0 || metadata.len() > self.max_file_size {
            debug!("skipping {} (size {})", path.display(), metadata.len());
            return Ok(0);
        }

        let bytes = tokio::fs::read(path).await?;
        let content_hash = format!("{:x}", md5::compute(&bytes));
        let records = self.build_records(path_str, bytes, content_hash).await?;
        if records.is_empty() {
            return Ok(0);
        }

        let count = records.len();
        store.lock().await.upsert(&records).await?;
        debug!("re-indexed {} ({count} chunks)", path.display());
        Ok(count)
    }

    /// Drop every record belonging to a deleted file.
    #[inline]
    pub async fn remove_file(&self, store: &Mutex<VectorStore>, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        store.lock().await.delete_by_file_path(&path_str).await?;
        debug!("removed records for {}", path.display());
        Ok(())
    }

    async fn process_file(
        &self,
        path: &Path,
        snapshot: &HashMap<String, String>,
        pending: &mut Vec<ChunkRecord>,
        stale: &mut Vec<String>,
    ) -> Result<FileOutcome> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("cannot stat {}: {e}", path.display());
                return Ok(FileOutcome::Skipped);
            }
        };
        if metadata.len() == 0 || metadata.len() > self.max_file_size {
            debug!("skipping {} (size {})", path.display(), metadata.len());
            return Ok(FileOutcome::Skipped);
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("cannot read {}: {e}", path.display());
                return Ok(FileOutcome::Skipped);
            }
        };

        let content_hash = format!("{:x}", md5::compute(&bytes));
        let path_str = path.to_string_lossy().to_string();

        match snapshot.get(&path_str) {
            Some(previous) if *previous == content_hash => return Ok(FileOutcome::Unchanged),
            Some(_) => stale.push(path_str.clone()),
            None => {}
        }

        let records = self.build_records(path_str, bytes, content_hash).await?;
        if records.is_empty() {
            return Ok(FileOutcome::Skipped);
        }

        let count = records.len();
        pending.extend(records);
        Ok(FileOutcome::Indexed(count))
    }

    /// Chunk on the blocking pool, embed, and assemble records. Embedding
    /// failures at batch level propagate; single items degrade to zero
    /// vectors inside the batch.
    async fn build_records(
        &self,
        path_str: String,
        bytes: Vec<u8>,
        content_hash: String,
    ) -> Result<Vec<ChunkRecord>> {
        let chunk_path = path_str.clone();
        let chunks = tokio::task::spawn_blocking(move || {
            let content = String::from_utf8_lossy(&bytes);
            chunker::chunk_file(&chunk_path, &content)
        })
        .await
        .map_err(|e| SearchError::Other(anyhow!("chunking task failed: {e}")))?;

        if chunks.is_empty() {
            debug!("no chunks for {path_str}");
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let outcome = self.embedder.embed_batch(&texts).await?;
        if !outcome.failed_indices.is_empty() {
            warn!(
                "{} of {} chunk embeddings failed for {path_str}",
                outcome.failed_indices.len(),
                chunks.len()
            );
        }

        let indexed_at = Utc::now().to_rfc3339();
        Ok(chunks
            .into_iter()
            .zip(outcome.embeddings)
            .map(|(chunk, embedding)| ChunkRecord {
                chunk,
                vector: embedding.vector,
                content_hash: content_hash.clone(),
                indexed_at: indexed_at.clone(),
            })
            .collect())
    }
}

/// Stale deletions drain before the records that replace them are written.
async fn flush(
    store: &Mutex<VectorStore>,
    stale: &mut Vec<String>,
    pending: &mut Vec<ChunkRecord>,
) -> Result<()> {
    let mut store = store.lock().await;
    for path in stale.drain(..) {
        store.delete_by_file_path(&path).await?;
    }
    if !pending.is_empty() {
        store.upsert(pending).await?;
        pending.clear();
    }
    Ok(())
}

fn scan_repository(root: &Path, ignore: &GlobSet, pruned: &HashSet<String>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.file_type().is_dir() {
                let name = entry.file_name().to_string_lossy();
                !pruned.contains(name.as_ref())
            } else {
                true
            }
        });

    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if Language::from_extension(ext).is_none() {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(&path);
        if ignore.is_match(relative) || ignore.is_match(&path) {
            continue;
        }
        if seen.insert(path.clone()) {
            files.push(path);
        }
    }

    files.sort();
    files
}

/// Directory names extracted from `**/<dir>/**` patterns; pruning these
/// keeps the walk from descending into dependency and VCS trees.
fn pruned_dir_names(patterns: &[String]) -> HashSet<String> {
    patterns
        .iter()
        .filter_map(|pattern| {
            pattern
                .strip_prefix("**/")
                .and_then(|rest| rest.strip_suffix("/**"))
                .filter(|name| !name.contains('/') && !name.contains('*'))
                .map(str::to_string)
        })
        .collect()
}
