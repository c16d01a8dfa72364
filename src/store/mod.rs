//! Embedded vector store backed by LanceDB.
//!
//! One table holds every chunk record: the chunk fields, its embedding
//! vector, the content hash of the file it came from, and the indexing
//! timestamp. Vector search, full-text search, and deletion by file path all
//! run against this table.

#[cfg(test)]
mod tests;

pub mod filter;

pub use filter::SearchFilter;

use crate::chunker::{Chunk, is_valid_chunk_id};
use crate::embeddings::EMBEDDING_DIMENSION;
use crate::{Result, SearchError};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::index::Index;
use lancedb::index::scalar::{FtsIndexBuilder, FullTextSearchQuery};
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TABLE_NAME: &str = "chunks";
/// Upper bound on rows visited by the manual keyword scan.
const KEYWORD_SCAN_CAP: usize = 10_000;
/// Ids deleted per batch during upsert deduplication.
const DELETE_BATCH: usize = 256;

/// Persisted form of a chunk: the chunk plus its vector and provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    /// L2-normalized embedding, [`EMBEDDING_DIMENSION`] components.
    pub vector: Vec<f32>,
    /// MD5 hex digest of the whole file the chunk was derived from.
    pub content_hash: String,
    /// RFC 3339 timestamp of record creation.
    pub indexed_at: String,
}

/// A chunk returned from a search, with its relevance score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub content_hash: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScoreColumn {
    /// `_distance` from a vector query; score is `1 - distance`.
    Distance,
    /// `_score` from the full-text index.
    Relevance,
    /// No score column; caller assigns scores.
    None,
}

/// Vector store over a single LanceDB table of chunk records.
pub struct VectorStore {
    connection: Connection,
    table_ready: bool,
    fts_ready: bool,
}

impl VectorStore {
    /// Open (or create) the store at the given index directory.
    #[inline]
    pub async fn open(index_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_path).map_err(|e| {
            SearchError::Store(format!("failed to create index directory: {e}"))
        })?;

        let uri = format!("file://{}", index_path.display());
        debug!("connecting to LanceDB at {uri}");

        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("failed to connect to LanceDB: {e}")))?;

        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("failed to list tables: {e}")))?;

        let table_ready = table_names.iter().any(|name| name == TABLE_NAME);
        let mut store = Self {
            connection,
            table_ready,
            fts_ready: false,
        };
        if table_ready {
            store.fts_ready = store.detect_fts_index().await;
        }

        info!("vector store ready (table exists: {table_ready})");
        Ok(store)
    }

    /// Insert records, replacing any prior record with the same id.
    /// An empty batch is a no-op. The table is created on first use.
    #[inline]
    pub async fn upsert(&mut self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("no records to upsert");
            return Ok(());
        }

        for record in records {
            if !is_valid_chunk_id(&record.chunk.id) {
                return Err(SearchError::InvalidId(record.chunk.id.clone()));
            }
            if record.vector.len() != EMBEDDING_DIMENSION {
                return Err(SearchError::Embedding(format!(
                    "vector for {} has {} components, expected {}",
                    record.chunk.id,
                    record.vector.len(),
                    EMBEDDING_DIMENSION
                )));
            }
        }

        self.ensure_table().await?;
        let table = self.open_table().await?;

        // Delete-then-insert keeps ids unique across re-runs.
        let ids: Vec<&str> = records.iter().map(|r| r.chunk.id.as_str()).collect();
        for batch in ids.chunks(DELETE_BATCH) {
            let list = batch
                .iter()
                .map(|id| format!("'{id}'"))
                .collect::<Vec<_>>()
                .join(", ");
            table
                .delete(&format!("id IN ({list})"))
                .await
                .map_err(|e| SearchError::Store(format!("failed to delete prior ids: {e}")))?;
        }

        let batch = build_record_batch(records)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("failed to insert records: {e}")))?;

        debug!("upserted {} records", records.len());
        Ok(())
    }

    /// Remove every record belonging to a file.
    #[inline]
    pub async fn delete_by_file_path(&self, file_path: &str) -> Result<()> {
        if !self.table_ready {
            return Ok(());
        }
        let table = self.open_table().await?;
        let escaped = file_path.replace('\'', "''");
        table
            .delete(&format!("file_path = '{escaped}'"))
            .await
            .map_err(|e| SearchError::Store(format!("failed to delete {file_path}: {e}")))?;
        debug!("deleted records for {file_path}");
        Ok(())
    }

    /// Drop the whole table.
    #[inline]
    pub async fn clear(&mut self) -> Result<()> {
        if !self.table_ready {
            return Ok(());
        }
        self.connection
            .drop_table(TABLE_NAME)
            .await
            .map_err(|e| SearchError::Store(format!("failed to drop table: {e}")))?;
        self.table_ready = false;
        self.fts_ready = false;
        info!("index cleared");
        Ok(())
    }

    /// Nearest-neighbor search by cosine distance; score is `1 - distance`.
    #[inline]
    pub async fn vector_search(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        if !self.table_ready {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| SearchError::Store(format!("failed to build vector query: {e}")))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit);

        if let Some(predicate) = filter {
            query = query.only_if(predicate.to_string());
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("vector search failed: {e}")))?;

        self.collect_results(stream, ScoreColumn::Distance).await
    }

    /// Lexical search over chunk content. Uses the full-text index when it
    /// exists, otherwise a bounded manual keyword scan.
    #[inline]
    pub async fn full_text_search(&self, text: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        if !self.table_ready {
            return Ok(Vec::new());
        }

        if self.fts_ready {
            match self.fts_search(text, limit).await {
                Ok(results) => return Ok(results),
                Err(e) => warn!("full-text index query failed, scanning instead: {e}"),
            }
        }

        self.keyword_scan(text, limit).await
    }

    /// Snapshot of `file_path -> content_hash`. The first hash seen per file
    /// wins; all records of a file share one hash at any point in time.
    #[inline]
    pub async fn get_indexed_files(&self) -> Result<HashMap<String, String>> {
        if !self.table_ready {
            return Ok(HashMap::new());
        }

        let table = self.open_table().await?;
        let mut stream = table
            .query()
            .select(Select::Columns(vec![
                "file_path".to_string(),
                "content_hash".to_string(),
            ]))
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("failed to read indexed files: {e}")))?;

        let mut files = HashMap::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| SearchError::Store(format!("failed to read result stream: {e}")))?
        {
            let paths = string_column(&batch, "file_path")?;
            let hashes = string_column(&batch, "content_hash")?;
            for row in 0..batch.num_rows() {
                files
                    .entry(paths.value(row).to_string())
                    .or_insert_with(|| hashes.value(row).to_string());
            }
        }
        Ok(files)
    }

    #[inline]
    pub async fn count(&self) -> Result<usize> {
        if !self.table_ready {
            return Ok(0);
        }
        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| SearchError::Store(format!("failed to count rows: {e}")))
    }

    #[inline]
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.count().await? == 0)
    }

    /// Release the connection handle. No persisted state is modified.
    #[inline]
    pub fn close(self) {
        debug!("vector store closed");
    }

    /// Compact and reorganize table data. Failure is non-fatal for callers.
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        if !self.table_ready {
            return Ok(());
        }
        let table = self.open_table().await?;
        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| SearchError::Store(format!("failed to optimize table: {e}")))?;
        info!("vector store optimized");
        Ok(())
    }

    /// Build an ANN index on the vector column.
    #[inline]
    pub async fn create_vector_index(&self) -> Result<()> {
        if !self.table_ready {
            return Ok(());
        }
        let table = self.open_table().await?;
        table
            .create_index(&["vector"], Index::Auto)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("failed to create vector index: {e}")))?;
        info!("vector index created");
        Ok(())
    }

    async fn ensure_table(&mut self) -> Result<()> {
        if self.table_ready {
            return Ok(());
        }

        let schema = chunk_schema();
        self.connection
            .create_empty_table(TABLE_NAME, schema)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("failed to create table: {e}")))?;
        self.table_ready = true;
        info!("created chunk table");

        // FTS creation happens once here; the keyword scan covers failures.
        let table = self.open_table().await?;
        match table
            .create_index(&["content"], Index::FTS(FtsIndexBuilder::default()))
            .execute()
            .await
        {
            Ok(()) => self.fts_ready = true,
            Err(e) => {
                warn!("failed to create full-text index: {e}");
                self.fts_ready = false;
            }
        }
        Ok(())
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("failed to open table: {e}")))
    }

    async fn detect_fts_index(&self) -> bool {
        let Ok(table) = self.open_table().await else {
            return false;
        };
        match table.list_indices().await {
            Ok(indices) => indices
                .iter()
                .any(|index| index.columns.iter().any(|c| c == "content")),
            Err(e) => {
                warn!("failed to list indices: {e}");
                false
            }
        }
    }

    async fn fts_search(&self, text: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        let table = self.open_table().await?;
        let stream = table
            .query()
            .full_text_search(FullTextSearchQuery::new(text.to_string()))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("full-text search failed: {e}")))?;
        self.collect_results(stream, ScoreColumn::Relevance).await
    }

    /// Manual keyword scan over at most [`KEYWORD_SCAN_CAP`] rows. Field
    /// weights: name 2.0, signature 1.5, content 1.0; normalized by
    /// `keywords * 4`.
    async fn keyword_scan(&self, text: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        let table = self.open_table().await?;
        let stream = table
            .query()
            .limit(KEYWORD_SCAN_CAP)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("keyword scan failed: {e}")))?;
        let rows = self.collect_results(stream, ScoreColumn::None).await?;

        if rows.len() == KEYWORD_SCAN_CAP {
            let total = self.count().await?;
            if total > KEYWORD_SCAN_CAP {
                warn!(
                    "keyword scan covered {KEYWORD_SCAN_CAP} of {total} rows; results are partial"
                );
            }
        }

        let keywords: Vec<String> = text
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let normalizer = keywords.len() as f32 * 4.0;

        let mut scored: Vec<ScoredChunk> = rows
            .into_iter()
            .filter_map(|mut row| {
                let raw = keyword_hits(&row.chunk, &keywords);
                if raw <= 0.0 {
                    return None;
                }
                row.score = raw / normalizer;
                Some(row)
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn collect_results(
        &self,
        mut stream: lancedb::arrow::SendableRecordBatchStream,
        score: ScoreColumn,
    ) -> Result<Vec<ScoredChunk>> {
        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| SearchError::Store(format!("failed to read result stream: {e}")))?
        {
            results.extend(parse_batch(&batch, score)?);
        }
        Ok(results)
    }
}

fn keyword_hits(chunk: &Chunk, keywords: &[String]) -> f32 {
    let name = chunk.name.as_deref().unwrap_or_default().to_lowercase();
    let signature = chunk.signature.as_deref().unwrap_or_default().to_lowercase();
    let content = chunk.content.to_lowercase();

    let mut score = 0.0f32;
    for keyword in keywords {
        score += 2.0 * substring_count(&name, keyword) as f32;
        score += 1.5 * substring_count(&signature, keyword) as f32;
        score += substring_count(&content, keyword) as f32;
    }
    score
}

fn substring_count(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

fn chunk_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("file_path", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("start_line", DataType::UInt32, false),
        Field::new("end_line", DataType::UInt32, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("node_type", DataType::Utf8, false),
        Field::new("signature", DataType::Utf8, true),
        Field::new("docstring", DataType::Utf8, true),
        Field::new("language", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                EMBEDDING_DIMENSION as i32,
            ),
            false,
        ),
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("indexed_at", DataType::Utf8, false),
    ]))
}

fn build_record_batch(records: &[ChunkRecord]) -> Result<RecordBatch> {
    let len = records.len();
    let mut ids = Vec::with_capacity(len);
    let mut file_paths = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut start_lines = Vec::with_capacity(len);
    let mut end_lines = Vec::with_capacity(len);
    let mut names = Vec::with_capacity(len);
    let mut node_types = Vec::with_capacity(len);
    let mut signatures = Vec::with_capacity(len);
    let mut docstrings = Vec::with_capacity(len);
    let mut languages = Vec::with_capacity(len);
    let mut content_hashes = Vec::with_capacity(len);
    let mut indexed_ats = Vec::with_capacity(len);
    let mut flat_vector = Vec::with_capacity(len * EMBEDDING_DIMENSION);

    for record in records {
        ids.push(record.chunk.id.as_str());
        file_paths.push(record.chunk.file_path.as_str());
        contents.push(record.chunk.content.as_str());
        start_lines.push(record.chunk.start_line);
        end_lines.push(record.chunk.end_line);
        names.push(record.chunk.name.as_deref());
        node_types.push(record.chunk.node_type.as_str());
        signatures.push(record.chunk.signature.as_deref());
        docstrings.push(record.chunk.docstring.as_deref());
        languages.push(record.chunk.language.as_str());
        content_hashes.push(record.content_hash.as_str());
        indexed_ats.push(record.indexed_at.as_str());
        flat_vector.extend_from_slice(&record.vector);
    }

    let item_field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        item_field,
        EMBEDDING_DIMENSION as i32,
        Arc::new(Float32Array::from(flat_vector)),
        None,
    )
    .map_err(|e| SearchError::Store(format!("failed to build vector array: {e}")))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(StringArray::from(file_paths)),
        Arc::new(StringArray::from(contents)),
        Arc::new(UInt32Array::from(start_lines)),
        Arc::new(UInt32Array::from(end_lines)),
        Arc::new(StringArray::from(names)),
        Arc::new(StringArray::from(node_types)),
        Arc::new(StringArray::from(signatures)),
        Arc::new(StringArray::from(docstrings)),
        Arc::new(StringArray::from(languages)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(content_hashes)),
        Arc::new(StringArray::from(indexed_ats)),
    ];

    RecordBatch::try_new(chunk_schema(), arrays)
        .map_err(|e| SearchError::Store(format!("failed to build record batch: {e}")))
}

/// Typed projection of a result batch. A missing or wrongly typed column is
/// a store error, not a panic.
fn parse_batch(batch: &RecordBatch, score: ScoreColumn) -> Result<Vec<ScoredChunk>> {
    let ids = string_column(batch, "id")?;
    let file_paths = string_column(batch, "file_path")?;
    let contents = string_column(batch, "content")?;
    let start_lines = u32_column(batch, "start_line")?;
    let end_lines = u32_column(batch, "end_line")?;
    let names = string_column(batch, "name")?;
    let node_types = string_column(batch, "node_type")?;
    let signatures = string_column(batch, "signature")?;
    let docstrings = string_column(batch, "docstring")?;
    let languages = string_column(batch, "language")?;
    let content_hashes = string_column(batch, "content_hash")?;

    let score_values = match score {
        ScoreColumn::Distance => Some(f32_column(batch, "_distance")?),
        ScoreColumn::Relevance => Some(f32_column(batch, "_score")?),
        ScoreColumn::None => None,
    };

    let mut results = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let chunk = Chunk {
            id: ids.value(row).to_string(),
            file_path: file_paths.value(row).to_string(),
            content: contents.value(row).to_string(),
            start_line: start_lines.value(row),
            end_line: end_lines.value(row),
            name: optional_value(names, row),
            node_type: node_types.value(row).to_string(),
            signature: optional_value(signatures, row),
            docstring: optional_value(docstrings, row),
            language: languages.value(row).to_string(),
        };

        let row_score = match (score, score_values) {
            (ScoreColumn::Distance, Some(values)) => {
                let distance = if values.is_null(row) {
                    0.0
                } else {
                    values.value(row)
                };
                1.0 - distance
            }
            (ScoreColumn::Relevance, Some(values)) => {
                if values.is_null(row) {
                    0.0
                } else {
                    values.value(row)
                }
            }
            _ => 0.0,
        };

        results.push(ScoredChunk {
            chunk,
            content_hash: content_hashes.value(row).to_string(),
            score: row_score,
        });
    }
    Ok(results)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SearchError::Store(format!("missing column {name}")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| SearchError::Store(format!("column {name} has the wrong type")))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SearchError::Store(format!("missing column {name}")))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| SearchError::Store(format!("column {name} has the wrong type")))
}

fn f32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SearchError::Store(format!("missing column {name}")))?
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| SearchError::Store(format!("column {name} has the wrong type")))
}

fn optional_value(array: &StringArray, row: usize) -> Option<String> {
    if array.is_null(row) {
        None
    } else {
        Some(array.value(row).to_string())
    }
}
