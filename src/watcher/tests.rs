use super::*;
use crate::config::IndexingConfig;
use crate::embeddings::{Embedder, Embedding, zero_vector};
use async_trait::async_trait;
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use tempfile::TempDir;

struct NoopEmbedder;

#[async_trait]
impl Embedder for NoopEmbedder {
    async fn embed_document(&self, _text: &str) -> crate::Result<Embedding> {
        Ok(Embedding {
            vector: zero_vector(),
            token_count: 0,
        })
    }

    async fn embed_query(&self, _text: &str) -> crate::Result<Embedding> {
        self.embed_document("").await
    }
}

#[test]
fn creates_and_modifications_coalesce_as_touch() {
    assert_eq!(
        classify(&EventKind::Create(CreateKind::File)),
        Some(Action::Touch)
    );
    assert_eq!(
        classify(&EventKind::Modify(ModifyKind::Any)),
        Some(Action::Touch)
    );
}

#[test]
fn removals_classify_as_remove() {
    assert_eq!(
        classify(&EventKind::Remove(RemoveKind::File)),
        Some(Action::Remove)
    );
}

#[test]
fn access_events_are_ignored() {
    assert_eq!(classify(&EventKind::Any), None);
    assert_eq!(
        classify(&EventKind::Access(notify::event::AccessKind::Any)),
        None
    );
}

#[test]
fn fresh_writes_are_not_stable() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("hot.rs");
    std::fs::write(&path, "fn hot() {}\n").expect("write");

    let metadata = std::fs::metadata(&path).expect("stat");
    assert!(!modified_before(&metadata, STABILITY_WINDOW));
    // A generous window in the other direction is trivially satisfied.
    assert!(modified_before(&metadata, Duration::ZERO));
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let temp_dir = TempDir::new().expect("temp dir");
    let store = VectorStore::open(&temp_dir.path().join("index"))
        .await
        .expect("store opens");
    let indexer = Arc::new(
        Indexer::new(
            temp_dir.path().to_path_buf(),
            Arc::new(NoopEmbedder),
            &IndexingConfig::default(),
        )
        .expect("indexer builds"),
    );

    let mut watcher = RepoWatcher::new(indexer, Arc::new(Mutex::new(store)));
    watcher.start();
    watcher.start();
    watcher.stop().await;
    watcher.stop().await;
}
