use super::*;
use crate::chunker::Chunk;
use tempfile::TempDir;

async fn test_store() -> (VectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::open(&temp_dir.path().join("index"))
        .await
        .expect("store opens");
    (store, temp_dir)
}

/// Unit vector with a single hot component; distinct axes are orthogonal.
fn axis_vector(axis: usize) -> Vec<f32> {
    let mut vector = vec![0.0; EMBEDDING_DIMENSION];
    vector[axis % EMBEDDING_DIMENSION] = 1.0;
    vector
}

fn test_record(id: &str, file_path: &str, axis: usize) -> ChunkRecord {
    ChunkRecord {
        chunk: Chunk {
            id: id.to_string(),
            file_path: file_path.to_string(),
            content: format!("function body for {id} with enough text to matter"),
            start_line: 1,
            end_line: 5,
            name: Some(format!("symbol_{axis}")),
            node_type: "function_declaration".to_string(),
            signature: Some(format!("function symbol_{axis}()")),
            docstring: None,
            language: "typescript".to_string(),
        },
        vector: axis_vector(axis),
        content_hash: format!("hash_{file_path}"),
        indexed_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

#[tokio::test]
async fn fresh_store_is_empty() {
    let (store, _temp_dir) = test_store().await;

    assert_eq!(store.count().await.expect("count"), 0);
    assert!(store.is_empty().await.expect("is_empty"));
    assert!(
        store
            .vector_search(&axis_vector(0), 10, None)
            .await
            .expect("search on empty store")
            .is_empty()
    );
    assert!(store.get_indexed_files().await.expect("snapshot").is_empty());
}

#[tokio::test]
async fn empty_upsert_is_a_no_op() {
    let (mut store, _temp_dir) = test_store().await;
    store.upsert(&[]).await.expect("empty upsert");
    assert_eq!(store.count().await.expect("count"), 0);
}

#[tokio::test]
async fn upsert_and_count() {
    let (mut store, _temp_dir) = test_store().await;

    let records = vec![
        test_record("a_ts_L1", "/repo/a.ts", 0),
        test_record("a_ts_L10", "/repo/a.ts", 1),
        test_record("b_ts_L1", "/repo/b.ts", 2),
    ];
    store.upsert(&records).await.expect("upsert");

    assert_eq!(store.count().await.expect("count"), 3);
    assert!(!store.is_empty().await.expect("is_empty"));
}

#[tokio::test]
async fn upsert_replaces_records_with_the_same_id() {
    let (mut store, _temp_dir) = test_store().await;

    let mut record = test_record("a_ts_L1", "/repo/a.ts", 0);
    store.upsert(std::slice::from_ref(&record)).await.expect("first upsert");

    record.chunk.content = "updated body".to_string();
    record.content_hash = "hash_v2".to_string();
    store.upsert(&[record]).await.expect("second upsert");

    assert_eq!(store.count().await.expect("count"), 1);

    let results = store
        .vector_search(&axis_vector(0), 10, None)
        .await
        .expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.content, "updated body");
    assert_eq!(results[0].content_hash, "hash_v2");
}

#[tokio::test]
async fn malformed_ids_are_rejected() {
    let (mut store, _temp_dir) = test_store().await;

    let mut record = test_record("ok_id_L1", "/repo/a.ts", 0);
    record.chunk.id = "bad id; DROP TABLE".to_string();

    let result = store.upsert(&[record]).await;
    assert!(matches!(result, Err(SearchError::InvalidId(_))));
}

#[tokio::test]
async fn wrong_vector_length_is_rejected() {
    let (mut store, _temp_dir) = test_store().await;

    let mut record = test_record("a_ts_L1", "/repo/a.ts", 0);
    record.vector = vec![0.5; 3];

    let result = store.upsert(&[record]).await;
    assert!(matches!(result, Err(SearchError::Embedding(_))));
}

#[tokio::test]
async fn vector_search_ranks_by_similarity() {
    let (mut store, _temp_dir) = test_store().await;

    let records = vec![
        test_record("near_L1", "/repo/near.ts", 0),
        test_record("far_L1", "/repo/far.ts", 1),
    ];
    store.upsert(&records).await.expect("upsert");

    let results = store
        .vector_search(&axis_vector(0), 10, None)
        .await
        .expect("search");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.id, "near_L1");
    assert!(results[0].score > results[1].score);
    assert!((results[0].score - 1.0).abs() < 1e-4, "identical vector scores ~1");
}

#[tokio::test]
async fn language_filter_restricts_results() {
    let (mut store, _temp_dir) = test_store().await;

    let mut python = test_record("py_L1", "/repo/app.py", 0);
    python.chunk.language = "python".to_string();
    let typescript = test_record("ts_L1", "/repo/app.ts", 1);
    store.upsert(&[python, typescript]).await.expect("upsert");

    let predicate = SearchFilter::new(None, Some("*.py".to_string()))
        .build()
        .expect("filter builds")
        .expect("filter is present");
    assert_eq!(predicate, "language = 'python'");

    let results = store
        .vector_search(&axis_vector(0), 10, Some(&predicate))
        .await
        .expect("search");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.language, "python");
}

#[tokio::test]
async fn injection_payload_leaves_the_store_intact() {
    let (mut store, _temp_dir) = test_store().await;

    store
        .upsert(&[test_record("a_ts_L1", "/repo/a.ts", 0)])
        .await
        .expect("upsert");

    let predicate = SearchFilter::new(Some("'; DROP TABLE--".to_string()), None)
        .build()
        .expect("payload sanitizes")
        .expect("predicate present");
    assert_eq!(predicate, "id LIKE '___DROP_TABLE--%'");

    let results = store
        .vector_search(&axis_vector(0), 10, Some(&predicate))
        .await
        .expect("search survives the payload");
    assert!(results.is_empty());

    // The table is still there and queryable.
    assert_eq!(store.count().await.expect("count"), 1);
}

#[tokio::test]
async fn delete_by_file_path_removes_only_that_file() {
    let (mut store, _temp_dir) = test_store().await;

    let records = vec![
        test_record("a_ts_L1", "/repo/a.ts", 0),
        test_record("a_ts_L10", "/repo/a.ts", 1),
        test_record("b_ts_L1", "/repo/b.ts", 2),
    ];
    store.upsert(&records).await.expect("upsert");

    store
        .delete_by_file_path("/repo/a.ts")
        .await
        .expect("delete");

    assert_eq!(store.count().await.expect("count"), 1);
    let snapshot = store.get_indexed_files().await.expect("snapshot");
    assert!(!snapshot.contains_key("/repo/a.ts"));
    assert!(snapshot.contains_key("/repo/b.ts"));
}

#[tokio::test]
async fn quoted_file_paths_delete_safely() {
    let (mut store, _temp_dir) = test_store().await;

    let quoted = "/repo/it's a file.ts";
    let mut record = test_record("quoted_L1", quoted, 0);
    record.chunk.file_path = quoted.to_string();
    store
        .upsert(&[record, test_record("b_ts_L1", "/repo/b.ts", 1)])
        .await
        .expect("upsert");

    store.delete_by_file_path(quoted).await.expect("delete");

    assert_eq!(store.count().await.expect("count"), 1);
}

#[tokio::test]
async fn indexed_files_snapshot_is_single_valued() {
    let (mut store, _temp_dir) = test_store().await;

    let records = vec![
        test_record("a_ts_L1", "/repo/a.ts", 0),
        test_record("a_ts_L10", "/repo/a.ts", 1),
    ];
    store.upsert(&records).await.expect("upsert");

    let snapshot = store.get_indexed_files().await.expect("snapshot");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get("/repo/a.ts"), Some(&"hash_/repo/a.ts".to_string()));
}

#[tokio::test]
async fn clear_drops_the_table() {
    let (mut store, _temp_dir) = test_store().await;

    store
        .upsert(&[test_record("a_ts_L1", "/repo/a.ts", 0)])
        .await
        .expect("upsert");
    store.clear().await.expect("clear");

    assert_eq!(store.count().await.expect("count"), 0);
    assert!(store.is_empty().await.expect("is_empty"));
}

#[tokio::test]
async fn keyword_scan_scores_name_over_content() {
    let (mut store, _temp_dir) = test_store().await;

    let mut named = test_record("named_L1", "/repo/named.ts", 0);
    named.chunk.name = Some("authenticate".to_string());
    named.chunk.signature = Some("function authenticate(token)".to_string());
    named.chunk.content = "function authenticate(token) { return check(token); }".to_string();

    let mut plain = test_record("plain_L1", "/repo/plain.ts", 1);
    plain.chunk.name = Some("helper".to_string());
    plain.chunk.signature = Some("function helper()".to_string());
    plain.chunk.content = "calls authenticate once".to_string();

    let mut unrelated = test_record("other_L1", "/repo/other.ts", 2);
    unrelated.chunk.name = Some("render".to_string());
    unrelated.chunk.signature = Some("function render()".to_string());
    unrelated.chunk.content = "paints the screen".to_string();

    store
        .upsert(&[named, plain, unrelated])
        .await
        .expect("upsert");

    let results = store
        .keyword_scan("authenticate", 10)
        .await
        .expect("scan");

    assert_eq!(results.len(), 2, "zero-score rows are dropped");
    assert_eq!(results[0].chunk.id, "named_L1");
    assert!(results[0].score > results[1].score);
    // Normalized by keywords * 4.
    assert!(results.iter().all(|r| r.score > 0.0));
}

#[tokio::test]
async fn full_text_search_on_empty_store_returns_nothing() {
    let (store, _temp_dir) = test_store().await;
    let results = store
        .full_text_search("anything", 10)
        .await
        .expect("search");
    assert!(results.is_empty());
}
