//! Debounced filesystem watcher driving per-file re-index and delete.
//!
//! Raw notify events are bridged from a dedicated thread onto a tokio
//! channel. Creates and modifications coalesce per path and fire once the
//! path has been quiet for the debounce window and its file stable for the
//! stability window; deletions apply immediately.

#[cfg(test)]
mod tests;

use notify::{Config as NotifyConfig, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::indexer::Indexer;
use crate::store::VectorStore;

/// A file must be quiet this long before its event is acted on.
pub const STABILITY_WINDOW: Duration = Duration::from_millis(500);
/// Events on the same path coalesce until this much time passes.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(1000);
const TICK: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Touch,
    Remove,
}

#[derive(Debug)]
enum WatchEvent {
    Touched(Vec<PathBuf>),
    Removed(Vec<PathBuf>),
}

/// Watches the indexer's root and keeps the store live.
pub struct RepoWatcher {
    root: PathBuf,
    indexer: Arc<Indexer>,
    store: Arc<Mutex<VectorStore>>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RepoWatcher {
    #[inline]
    pub fn new(indexer: Arc<Indexer>, store: Arc<Mutex<VectorStore>>) -> Self {
        Self {
            root: indexer.root().to_path_buf(),
            indexer,
            store,
            shutdown: CancellationToken::new(),
            handle: None,
        }
    }

    /// Start watching. Calling start on a running watcher is a no-op.
    #[inline]
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }

        self.shutdown = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let root = self.root.clone();
        let pump_indexer = Arc::clone(&self.indexer);
        let pump_shutdown = self.shutdown.clone();
        std::thread::spawn(move || {
            if let Err(e) = pump_events(&root, &pump_indexer, &tx, &pump_shutdown) {
                warn!("filesystem watcher stopped: {e}");
            }
        });

        let indexer = Arc::clone(&self.indexer);
        let store = Arc::clone(&self.store);
        let shutdown = self.shutdown.clone();
        self.handle = Some(tokio::spawn(run_debounce_loop(rx, indexer, store, shutdown)));

        info!("watching {} for changes", self.root.display());
    }

    /// Stop watching and cancel pending debounce timers. Idempotent.
    #[inline]
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        debug!("watcher stopped");
    }
}

/// Bridge notify's callback world onto the tokio channel. Runs on its own
/// thread so the blocking receive never touches the async runtime.
fn pump_events(
    root: &Path,
    indexer: &Indexer,
    tx: &mpsc::UnboundedSender<WatchEvent>,
    shutdown: &CancellationToken,
) -> notify::Result<()> {
    let (watch_tx, watch_rx) = std_mpsc::channel();
    let mut watcher = RecommendedWatcher::new(watch_tx, NotifyConfig::default())?;
    watcher.watch(root, RecursiveMode::Recursive)?;

    loop {
        if shutdown.is_cancelled() {
            break;
        }
        match watch_rx.recv_timeout(TICK) {
            Ok(Ok(event)) => {
                let Some(action) = classify(&event.kind) else {
                    continue;
                };
                let paths: Vec<PathBuf> = event
                    .paths
                    .iter()
                    .filter(|path| indexer.is_indexable(path))
                    .cloned()
                    .collect();
                if paths.is_empty() {
                    continue;
                }
                let message = match action {
                    Action::Touch => WatchEvent::Touched(paths),
                    Action::Remove => WatchEvent::Removed(paths),
                };
                if tx.send(message).is_err() {
                    break;
                }
            }
            Ok(Err(err)) => warn!("watch error: {err:?}"),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}

fn classify(kind: &EventKind) -> Option<Action> {
    match kind {
        EventKind::Create(_) | EventKind::Modify(_) => Some(Action::Touch),
        EventKind::Remove(_) => Some(Action::Remove),
        _ => None,
    }
}

async fn run_debounce_loop(
    mut rx: mpsc::UnboundedReceiver<WatchEvent>,
    indexer: Arc<Indexer>,
    store: Arc<Mutex<VectorStore>>,
    shutdown: CancellationToken,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    let mut tick = tokio::time::interval(TICK);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => {
                match event {
                    Some(WatchEvent::Touched(paths)) => {
                        let now = Instant::now();
                        for path in paths {
                            pending.insert(path, now);
                        }
                    }
                    Some(WatchEvent::Removed(paths)) => {
                        for path in paths {
                            pending.remove(&path);
                            if let Err(e) = indexer.remove_file(&store, &path).await {
                                warn!("failed to remove records for {}: {e}", path.display());
                            }
                        }
                    }
                    None => break,
                }
            }
            _ = tick.tick() => {
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, last)| now.duration_since(**last) >= DEBOUNCE_WINDOW)
                    .map(|(path, _)| path.clone())
                    .collect();

                for path in due {
                    let Ok(metadata) = tokio::fs::metadata(&path).await else {
                        // Vanished between the event and the timer.
                        pending.remove(&path);
                        continue;
                    };
                    if !modified_before(&metadata, STABILITY_WINDOW) {
                        // Writer still active; check again next tick.
                        continue;
                    }
                    pending.remove(&path);
                    match indexer.index_file(&store, &path).await {
                        Ok(chunks) => debug!("live re-index of {} ({chunks} chunks)", path.display()),
                        Err(e) => warn!("live re-index of {} failed: {e}", path.display()),
                    }
                }
            }
        }
    }

    debug!("debounce loop exited with {} pending paths", pending.len());
}

fn modified_before(metadata: &std::fs::Metadata, window: Duration) -> bool {
    match metadata.modified() {
        Ok(modified) => match modified.elapsed() {
            Ok(elapsed) => elapsed >= window,
            // Clock skew puts the mtime in the future; treat as unstable.
            Err(_) => false,
        },
        // Platform without mtime support.
        Err(_) => true,
    }
}
