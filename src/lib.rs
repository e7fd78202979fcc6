//! In-memory, sorted, queryable filesystem index engine with live
//! monitoring and binary snapshots.
//!
//! The engine aggregates one or more configured roots into a single
//! [`store::IndexStore`], keeps a handful of fast sort orderings over it,
//! and exposes everything through a single-threaded [`queue::WorkQueueOrchestrator`]
//! so an embedder never has to serialize operations itself. Scanning,
//! filesystem monitoring, query evaluation, and the set of configured roots
//! are all external collaborators ([`scanner::Scanner`], [`monitor::Monitor`],
//! [`query::Query`], [`include::IncludeManager`], [`exclude::ExcludeManager`])
//! — this crate only defines the interface and a reasonable default for
//! each; an embedder supplying its own production query language or config
//! file format implements the corresponding trait.

mod cancel;
mod codec;
mod container;
mod entry;
mod error;
mod events;
mod exclude;
mod include;
mod index;
mod log;
mod monitor;
mod query;
mod queue;
mod scanner;
mod store;
mod threadpool;
mod view;

pub use cancel::CancelToken;
pub use codec::{load as load_snapshot, save as save_snapshot, LoadedSnapshot};
pub use container::EntriesContainer;
pub use entry::{Entry, EntryType, SortKey, FAST_SORT_KEYS};
pub use error::{FsearchError, Result, ResultCode};
pub use events::{
    ChannelEventSink, DatabaseInfo, EngineEvent, EntryInfo, EventSink, IndexEvent, IndexEventKind,
    SearchInfo,
};
pub use exclude::{ExcludeManager, GitignoreExcludeManager};
pub use include::{Include, IncludeManager, SimpleIncludeManager};
pub use index::{IndexFlags, IndexState, PerRootIndex};
pub use monitor::{Monitor, NotifyMonitor, RawFsEvent};
pub use query::{MatchAll, NameGlob, Query};
pub use queue::{Work, WorkQueueOrchestrator};
pub use scanner::{Scanner, WalkDirScanner};
pub use store::IndexStore;
pub use threadpool::ThreadPool;
pub use view::{SearchView, SelectionMutation, SortDirection};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Ambient configuration the engine itself needs, independent of any single
/// store's flags or includes: where snapshots live, how many worker
/// threads to run match/sort work on, and how long to coalesce filesystem
/// events before applying them as one batch.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub worker_threads: usize,
    pub watch_debounce: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            data_dir: std::env::temp_dir().join("fsearch-engine"),
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            watch_debounce: Duration::from_millis(200),
        }
    }
}

/// Top-level handle an embedder constructs once: owns the store, the work
/// queue, and the shared match/sort thread pool.
pub struct Engine {
    config: EngineConfig,
    store: Arc<IndexStore>,
    orchestrator: WorkQueueOrchestrator,
    threadpool: Arc<ThreadPool>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        include_mgr: Box<dyn IncludeManager>,
        exclude_mgr: Box<dyn ExcludeManager>,
        flags: IndexFlags,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        let store = Arc::new(IndexStore::new(
            include_mgr,
            exclude_mgr,
            flags,
            Arc::clone(&event_sink),
        ));
        let threadpool = Arc::new(ThreadPool::new(config.worker_threads));
        let orchestrator =
            WorkQueueOrchestrator::new(Arc::clone(&store), Arc::clone(&threadpool), event_sink);
        Engine { config, store, orchestrator, threadpool }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Queues one operation; see [`Work`] for the full set and which ones
    /// additionally reply over a channel.
    pub fn submit(&self, work: Work) {
        self.orchestrator.submit(work);
    }

    pub fn allocate_view_id(&self) -> u32 {
        self.orchestrator.allocate_view_id()
    }

    /// Trips the cancellation token backing whatever `Scan`/`Rescan`/load
    /// is currently running, if any.
    pub fn cancel_current(&self) {
        self.orchestrator.cancel_current();
    }

    /// Starts live monitoring on every index currently in the store,
    /// spawning one debounced watcher thread per root.
    pub fn start_monitoring(&self) {
        self.store.start_monitoring(self.config.watch_debounce);
    }

    pub fn try_get_database_info(&self) -> Result<DatabaseInfo> {
        self.orchestrator.try_get_database_info()
    }

    pub fn try_get_search_info(&self, view_id: u32) -> Result<SearchInfo> {
        self.orchestrator.try_get_search_info(view_id)
    }

    pub fn try_get_item_info(&self, view_id: u32, idx: usize) -> Result<EntryInfo> {
        self.orchestrator.try_get_item_info(view_id, idx)
    }

    pub fn is_selected(&self, view_id: u32, entry: &Arc<Entry>) -> Result<bool> {
        self.orchestrator.is_selected(view_id, entry)
    }

    pub fn threadpool(&self) -> &ThreadPool {
        &self.threadpool
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// Stops the work-queue thread, draining anything already queued first.
    pub fn shutdown(&self) {
        self.orchestrator.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelEventSink;
    use std::sync::mpsc;

    #[test]
    fn engine_config_defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert!(cfg.worker_threads >= 1);
        assert!(cfg.watch_debounce > Duration::ZERO);
    }

    #[test]
    fn engine_allocates_distinct_view_ids() {
        let (tx, _rx) = mpsc::channel::<EngineEvent>();
        let engine = Engine::new(
            EngineConfig::default(),
            Box::new(SimpleIncludeManager::default()),
            Box::new(GitignoreExcludeManager::empty()),
            IndexFlags::SIZE | IndexFlags::MODIFICATION_TIME,
            Arc::new(ChannelEventSink(tx)),
        );
        let a = engine.allocate_view_id();
        let b = engine.allocate_view_id();
        assert_ne!(a, b);
        engine.shutdown();
    }
}
