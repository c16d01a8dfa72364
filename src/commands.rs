use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::embeddings::{Embedder, HttpReranker, OllamaClient, Reranker};
use crate::indexer::Indexer;
use crate::mcp::{McpServer, SemanticSearchHandler};
use crate::search::{SearchEngine, SearchRequest};
use crate::store::VectorStore;
use crate::watcher::RepoWatcher;
use crate::Result;

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(OllamaClient::new(&config.ollama)?))
}

fn build_reranker(config: &Config) -> Result<Option<Arc<dyn Reranker>>> {
    if config.reranker.enabled {
        Ok(Some(Arc::new(HttpReranker::new(&config.reranker)?)))
    } else {
        Ok(None)
    }
}

/// Start the MCP server on stdio, with the watcher keeping the index live.
#[inline]
pub async fn serve_mcp(config: Config) -> Result<()> {
    info!(
        "serving semantic search for {} (index at {})",
        config.root.display(),
        config.index_path.display()
    );

    let store = Arc::new(Mutex::new(VectorStore::open(&config.index_path).await?));
    let embedder = build_embedder(&config)?;
    let reranker = build_reranker(&config)?;
    let indexer = Arc::new(Indexer::new(
        config.root.clone(),
        Arc::clone(&embedder),
        &config.indexing,
    )?);
    let engine = Arc::new(SearchEngine::new(
        Arc::clone(&store),
        embedder,
        reranker,
        Arc::clone(&indexer),
    ));

    let mut watcher = RepoWatcher::new(Arc::clone(&indexer), Arc::clone(&store));
    watcher.start();

    let server = Arc::new(McpServer::new(
        env!("CARGO_PKG_NAME").to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    ));
    server
        .register_tool(
            SemanticSearchHandler::tool_definition(),
            SemanticSearchHandler::new(engine),
        )
        .await;

    tokio::select! {
        result = Arc::clone(&server).serve_stdio() => {
            result.context("MCP server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    // Shutdown order: watcher first (cancels debounce timers), then the store.
    watcher.stop().await;
    drop(watcher);
    drop(server);
    if let Ok(mutex) = Arc::try_unwrap(store) {
        mutex.into_inner().close();
    }
    Ok(())
}

/// Run a full indexing pass, then optimize the store.
#[inline]
pub async fn run_index(config: Config) -> Result<()> {
    let store = Mutex::new(VectorStore::open(&config.index_path).await?);
    let embedder = build_embedder(&config)?;

    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Indexing files")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };

    let progress_bar = bar.clone();
    let indexer = Indexer::new(config.root.clone(), embedder, &config.indexing)?
        .with_progress(Box::new(move |progress| {
            progress_bar.set_length(progress.total as u64);
            progress_bar.set_position(progress.processed as u64);
        }));

    let stats = indexer.index_repository(&store).await?;
    bar.finish_and_clear();

    let store = store.into_inner();
    if let Err(e) = store.optimize().await {
        warn!("failed to optimize store: {e}");
    }
    if let Err(e) = store.create_vector_index().await {
        warn!("failed to create vector index: {e}");
    }

    println!("Indexing complete!");
    println!("  Files scanned: {}", stats.total_files);
    println!("  Files indexed: {}", stats.indexed_files);
    println!("  Files skipped: {}", stats.skipped_files);
    println!("  Chunks stored: {}", stats.total_chunks);
    println!("  Duration: {} ms", stats.duration_ms);

    store.close();
    Ok(())
}

/// One-shot query from the command line, useful for inspecting rankings.
#[inline]
pub async fn run_search(config: Config, query: String, limit: usize) -> Result<()> {
    let store = Arc::new(Mutex::new(VectorStore::open(&config.index_path).await?));
    let embedder = build_embedder(&config)?;
    let reranker = build_reranker(&config)?;
    let indexer = Arc::new(Indexer::new(
        config.root.clone(),
        Arc::clone(&embedder),
        &config.indexing,
    )?);
    let engine = SearchEngine::new(Arc::clone(&store), embedder, reranker, indexer);

    let request = SearchRequest {
        query: query.clone(),
        limit,
        ..SearchRequest::default()
    };
    let hits = engine.search(&request).await?;

    if hits.is_empty() {
        println!("No results for {query:?}.");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} [{}:{}-{}] (score {:.3})",
            rank + 1,
            hit.chunk.name.as_deref().unwrap_or("<anonymous>"),
            hit.chunk.file_path,
            hit.chunk.start_line,
            hit.chunk.end_line,
            hit.combined_score
        );
        if let Some(signature) = &hit.chunk.signature {
            println!("   {signature}");
        }
    }
    Ok(())
}

/// Report the health of the store and the model endpoints.
#[inline]
pub async fn show_status(config: Config) -> Result<()> {
    println!("📊 Semantic Code Search Status");
    println!("{}", "=".repeat(50));
    println!();
    println!("Root:  {}", config.root.display());
    println!("Index: {}", config.index_path.display());
    println!();

    println!("🗄️  Vector Store:");
    match VectorStore::open(&config.index_path).await {
        Ok(store) => match store.count().await {
            Ok(count) => println!("   ✅ LanceDB: Connected ({count} chunks indexed)"),
            Err(e) => println!("   ⚠️  LanceDB: Connected but unreadable - {e}"),
        },
        Err(e) => println!("   ❌ LanceDB: Failed to open - {e}"),
    }

    println!("🤖 Embedder:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => {
            let model = client.model().to_string();
            let health = tokio::task::spawn_blocking(move || client.health_check())
                .await
                .context("health check task failed")?;
            match health {
                Ok(()) => {
                    println!(
                        "   ✅ Ollama: Connected ({}:{})",
                        config.ollama.host, config.ollama.port
                    );
                    println!("   📋 Model: {model}");
                }
                Err(e) => println!("   ⚠️  Ollama: Unhealthy - {e}"),
            }
        }
        Err(e) => println!("   ❌ Ollama: Failed to configure - {e}"),
    }

    println!("🔁 Reranker:");
    if config.reranker.enabled {
        match HttpReranker::new(&config.reranker) {
            Ok(reranker) => {
                let health = tokio::task::spawn_blocking(move || reranker.health_check())
                    .await
                    .context("health check task failed")?;
                match health {
                    Ok(()) => println!(
                        "   ✅ Reranker: Connected ({}:{})",
                        config.reranker.host, config.reranker.port
                    ),
                    Err(e) => println!("   ⚠️  Reranker: Unhealthy - {e}"),
                }
            }
            Err(e) => println!("   ❌ Reranker: Failed to configure - {e}"),
        }
    } else {
        println!("   💤 Disabled");
    }

    Ok(())
}

/// Drop the index entirely. Recovery is a fresh indexing run.
#[inline]
pub async fn clear_index(config: Config) -> Result<()> {
    let mut store = VectorStore::open(&config.index_path).await?;
    let count = store.count().await?;
    store.clear().await?;
    println!(
        "Cleared {count} chunks from {}",
        config.index_path.display()
    );
    store.close();
    Ok(())
}
