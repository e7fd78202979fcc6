//! Work-queue orchestrator (spec §4.5/§6): a single FIFO consumer thread
//! serializing every structural and per-view operation, so an embedder never
//! has to reason about interleaving a `Scan` with a `Sort` itself. Modeled
//! on the same dedicated-thread-plus-channel shape this repo already uses
//! for its filesystem watcher in `store.rs`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{mpsc, Arc};

use parking_lot::{Mutex, RwLock};

use crate::cancel::CancelToken;
use crate::codec;
use crate::entry::{Entry, EntryType, SortKey};
use crate::error::{FsearchError, Result};
use crate::events::{DatabaseInfo, EngineEvent, EntryInfo, EventSink, SearchInfo};
use crate::exclude::ExcludeManager;
use crate::include::IncludeManager;
use crate::log::perf_log;
use crate::query::{MatchAll, Query};
use crate::store::IndexStore;
use crate::threadpool::ThreadPool;
use crate::view::{SearchView, SelectionMutation, SortDirection};

/// One queued operation. Everything except `GetItemInfo` is fire-and-forget,
/// reporting its outcome only via [`EngineEvent`]s; `GetItemInfo` additionally
/// replies once, synchronously, over the channel the caller supplies.
pub enum Work {
    LoadFromFile {
        dir: std::path::PathBuf,
    },
    SaveToFile {
        dir: std::path::PathBuf,
    },
    /// A no-op if `include_mgr`/`exclude_mgr` are equal (by `equal()`) to
    /// the store's current configuration and the store is already running
    /// (spec §8 scenario 4).
    Scan {
        include_mgr: Box<dyn IncludeManager>,
        exclude_mgr: Box<dyn ExcludeManager>,
    },
    /// Forces a full re-walk of every configured root, unlike `Scan`'s
    /// "skip roots already indexed" merge.
    Rescan,
    Search {
        view_id: u32,
        query: Box<dyn Query>,
        sort_order: SortKey,
        secondary_sort_order: SortKey,
        sort_direction: SortDirection,
    },
    Sort {
        view_id: u32,
        sort_order: SortKey,
        secondary_sort_order: SortKey,
        sort_direction: SortDirection,
    },
    ModifySelection {
        view_id: u32,
        mutation: SelectionMutation,
    },
    GetItemInfo {
        view_id: u32,
        idx: usize,
        reply: mpsc::Sender<Result<EntryInfo>>,
    },
    Quit,
}

struct Shared {
    store: Arc<IndexStore>,
    threadpool: Arc<ThreadPool>,
    views: RwLock<HashMap<u32, Arc<SearchView>>>,
    next_view_id: AtomicU32,
    event_sink: Arc<dyn EventSink>,
    current_cancel: Mutex<Option<CancelToken>>,
}

/// Owns the FIFO and the worker thread draining it. `submit` never blocks;
/// callers that need an answer (`GetItemInfo`, or any of the `try_get_*`
/// reads) either pass a reply channel or call one of the non-blocking
/// accessors below, which never enqueue anything.
pub struct WorkQueueOrchestrator {
    shared: Arc<Shared>,
    sender: mpsc::Sender<Work>,
    worker: std::sync::Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl WorkQueueOrchestrator {
    pub fn new(store: Arc<IndexStore>, threadpool: Arc<ThreadPool>, event_sink: Arc<dyn EventSink>) -> Self {
        let shared = Arc::new(Shared {
            store,
            threadpool,
            views: RwLock::new(HashMap::new()),
            next_view_id: AtomicU32::new(1),
            event_sink,
            current_cancel: Mutex::new(None),
        });
        let (sender, receiver) = mpsc::channel::<Work>();
        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("fsearch-work-queue".into())
            .spawn(move || {
                for work in receiver {
                    if matches!(work, Work::Quit) {
                        break;
                    }
                    process(&worker_shared, work);
                }
            })
            .expect("failed to spawn work-queue thread");

        WorkQueueOrchestrator {
            shared,
            sender,
            worker: std::sync::Mutex::new(Some(handle)),
        }
    }

    /// Allocates a view id for a caller about to submit `Work::Search`.
    pub fn allocate_view_id(&self) -> u32 {
        self.shared.next_view_id.fetch_add(1, AtomicOrdering::AcqRel)
    }

    pub fn submit(&self, work: Work) {
        let _ = self.sender.send(work);
    }

    /// Trips the cancellation token for whatever `Scan`/`Rescan`/load is
    /// currently running, if any (spec §5).
    pub fn cancel_current(&self) {
        if let Some(token) = self.shared.current_cancel.lock().as_ref() {
            token.cancel();
        }
    }

    /// Stops the worker thread after draining anything already queued.
    pub fn shutdown(&self) {
        let _ = self.sender.send(Work::Quit);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    pub fn try_get_database_info(&self) -> Result<DatabaseInfo> {
        if self.shared.store.is_busy() {
            return Err(FsearchError::Busy);
        }
        Ok(DatabaseInfo {
            num_folders: self.shared.store.num_folders() as u64,
            num_files: self.shared.store.num_files() as u64,
        })
    }

    pub fn try_get_search_info(&self, view_id: u32) -> Result<SearchInfo> {
        if self.shared.store.is_busy() {
            return Err(FsearchError::Busy);
        }
        let views = self.shared.views.read();
        let view = views.get(&view_id).ok_or(FsearchError::UnknownSearchView(view_id))?;
        Ok(SearchInfo {
            view_id,
            num_folders: view.num_folders() as u64,
            num_files: view.num_files() as u64,
        })
    }

    pub fn try_get_item_info(&self, view_id: u32, idx: usize) -> Result<EntryInfo> {
        if self.shared.store.is_busy() {
            return Err(FsearchError::Busy);
        }
        let views = self.shared.views.read();
        let view = views.get(&view_id).ok_or(FsearchError::UnknownSearchView(view_id))?;
        let e = view.get_entry(idx).ok_or(FsearchError::EntryNotFound)?;
        Ok(entry_info(&self.shared.store, &e))
    }

    pub fn is_selected(&self, view_id: u32, entry: &Arc<Entry>) -> Result<bool> {
        let views = self.shared.views.read();
        let view = views.get(&view_id).ok_or(FsearchError::UnknownSearchView(view_id))?;
        Ok(view.is_selected(entry))
    }
}

impl Drop for WorkQueueOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn entry_info(store: &IndexStore, e: &Arc<Entry>) -> EntryInfo {
    let is_folder = e.entry_type == EntryType::Folder;
    EntryInfo {
        path: e.path(),
        name: e.name.clone(),
        is_folder,
        size: if is_folder { store.recursive_folder_size(e) } else { e.size },
        mtime: e.mtime,
        extension: e.extension().to_string(),
    }
}

fn process(shared: &Arc<Shared>, work: Work) {
    match work {
        Work::Quit => {}
        Work::LoadFromFile { dir } => process_load(shared, &dir),
        Work::SaveToFile { dir } => process_save(shared, &dir),
        Work::Scan { include_mgr, exclude_mgr } => process_scan(shared, include_mgr, exclude_mgr),
        Work::Rescan => process_rescan(shared),
        Work::Search { view_id, query, sort_order, secondary_sort_order, sort_direction } => {
            process_search(shared, view_id, query, sort_order, secondary_sort_order, sort_direction)
        }
        Work::Sort { view_id, sort_order, secondary_sort_order, sort_direction } => {
            process_sort(shared, view_id, sort_order, secondary_sort_order, sort_direction)
        }
        Work::ModifySelection { view_id, mutation } => process_modify_selection(shared, view_id, mutation),
        Work::GetItemInfo { view_id, idx, reply } => process_get_item_info(shared, view_id, idx, reply),
    }
}

fn process_load(shared: &Arc<Shared>, dir: &std::path::Path) {
    shared.event_sink.post(EngineEvent::LoadStarted);
    match codec::load(dir) {
        Ok(loaded) => {
            shared.store.restore(loaded.indices, loaded.folder_containers, loaded.file_containers);
            shared.event_sink.post(EngineEvent::LoadFinished(DatabaseInfo {
                num_folders: shared.store.num_folders() as u64,
                num_files: shared.store.num_files() as u64,
            }));
        }
        Err(e) => {
            perf_log(format!("load_from_file failed: {e}"));
            // Decode failure still reaches a usable state (spec §7): fall
            // back to an empty store rather than leaving whatever was
            // previously loaded half-trusted.
            shared.store.reset();
            shared.event_sink.post(EngineEvent::LoadFinished(DatabaseInfo {
                num_folders: 0,
                num_files: 0,
            }));
        }
    }
}

fn process_save(shared: &Arc<Shared>, dir: &std::path::Path) {
    shared.event_sink.post(EngineEvent::SaveStarted);
    match codec::save(&shared.store, dir) {
        Ok(()) => shared.event_sink.post(EngineEvent::SaveFinished),
        Err(e) => perf_log(format!("save_to_file failed: {e}")),
    }
}

fn process_scan(shared: &Arc<Shared>, include_mgr: Box<dyn IncludeManager>, exclude_mgr: Box<dyn ExcludeManager>) {
    if shared.store.is_running() && shared.store.config_equals(include_mgr.as_ref(), exclude_mgr.as_ref()) {
        perf_log("scan skipped: configuration unchanged (spec config-equality no-op)");
        return;
    }
    shared.store.reconfigure(include_mgr, exclude_mgr);
    run_scan(shared);
}

fn process_rescan(shared: &Arc<Shared>) {
    shared.store.reset();
    run_scan(shared);
}

fn run_scan(shared: &Arc<Shared>) {
    let cancel = CancelToken::new();
    *shared.current_cancel.lock() = Some(cancel.clone());
    shared.event_sink.post(EngineEvent::ScanStarted);
    let result = shared.store.start(&cancel);
    *shared.current_cancel.lock() = None;
    match result {
        Ok(()) => shared.event_sink.post(EngineEvent::ScanFinished(DatabaseInfo {
            num_folders: shared.store.num_folders() as u64,
            num_files: shared.store.num_files() as u64,
        })),
        Err(e) => perf_log(format!("scan failed: {e}")),
    }
}

fn process_search(
    shared: &Arc<Shared>,
    view_id: u32,
    query: Box<dyn Query>,
    sort_order: SortKey,
    secondary_sort_order: SortKey,
    sort_direction: SortDirection,
) {
    shared.event_sink.post(EngineEvent::SearchStarted { view_id });
    let query: Arc<dyn Query> = Arc::from(query);

    // Skip the parallel match pass entirely when a previous, narrower query
    // already proved empty (§B negative-name cache): refining an empty
    // substring match can only still be empty.
    let cache_key = query.negative_cache_key().map(|k| k.to_lowercase());
    if let Some(key) = &cache_key {
        if shared.store.negative_cache_lookup(key) {
            match SearchView::new(
                view_id,
                Arc::clone(&query),
                Vec::new(),
                Vec::new(),
                true,
                None,
                sort_order,
                secondary_sort_order,
                sort_direction,
            ) {
                Ok(view) => {
                    let info = SearchInfo { view_id, num_folders: 0, num_files: 0 };
                    let view = Arc::new(view);
                    shared.store.register_view(&view);
                    shared.views.write().insert(view_id, view);
                    shared.event_sink.post(EngineEvent::SearchFinished(info));
                }
                Err(e) => perf_log(format!("search view={view_id} failed: {e}")),
            }
            return;
        }
    }

    let folders = shared.store.get_folders(SortKey::Name).map(|c| c.joined()).unwrap_or_default();
    let files = shared.store.get_files(SortKey::Name).map(|c| c.joined()).unwrap_or_default();
    // Query evaluation is parallelised across the shared thread pool (spec
    // §4.5); SearchView is told the results are already matched so it only
    // has to sort, not re-filter the same entries sequentially.
    let matched_folders = shared.threadpool.filter_matching(&folders, query.as_ref());
    let matched_files = shared.threadpool.filter_matching(&files, query.as_ref());

    if let Some(key) = &cache_key {
        if matched_folders.is_empty() && matched_files.is_empty() {
            shared.store.negative_cache_remember(key);
        }
    }

    match SearchView::new(
        view_id,
        Arc::clone(&query),
        matched_files,
        matched_folders,
        true,
        None,
        sort_order,
        secondary_sort_order,
        sort_direction,
    ) {
        Ok(view) => {
            let info = SearchInfo {
                view_id,
                num_folders: view.num_folders() as u64,
                num_files: view.num_files() as u64,
            };
            let view = Arc::new(view);
            shared.store.register_view(&view);
            shared.views.write().insert(view_id, view);
            shared.event_sink.post(EngineEvent::SearchFinished(info));
        }
        Err(e) => perf_log(format!("search view={view_id} failed: {e}")),
    }
}

fn process_sort(
    shared: &Arc<Shared>,
    view_id: u32,
    sort_order: SortKey,
    secondary_sort_order: SortKey,
    sort_direction: SortDirection,
) {
    let Some(old) = shared.views.read().get(&view_id).cloned() else {
        perf_log(format!("sort: unknown view {view_id}"));
        return;
    };
    shared.event_sink.post(EngineEvent::SortStarted { view_id });
    let (file_sel, folder_sel) = old.selection_snapshot();
    match SearchView::new(
        view_id,
        Arc::clone(old.query()),
        old.file_entries(),
        old.folder_entries(),
        true,
        Some((&file_sel, &folder_sel)),
        sort_order,
        secondary_sort_order,
        sort_direction,
    ) {
        Ok(view) => {
            let info = SearchInfo {
                view_id,
                num_folders: view.num_folders() as u64,
                num_files: view.num_files() as u64,
            };
            let view = Arc::new(view);
            shared.store.register_view(&view);
            shared.views.write().insert(view_id, view);
            shared.event_sink.post(EngineEvent::SortFinished(info));
        }
        Err(e) => perf_log(format!("sort view={view_id} failed: {e}")),
    }
}

fn process_modify_selection(shared: &Arc<Shared>, view_id: u32, mutation: SelectionMutation) {
    let Some(view) = shared.views.read().get(&view_id).cloned() else {
        perf_log(format!("modify_selection: unknown view {view_id}"));
        return;
    };
    view.apply_selection(mutation);
    shared.event_sink.post(EngineEvent::SelectionChanged {
        view_id,
        info: SearchInfo {
            view_id,
            num_folders: view.num_folders() as u64,
            num_files: view.num_files() as u64,
        },
    });
}

fn process_get_item_info(shared: &Arc<Shared>, view_id: u32, idx: usize, reply: mpsc::Sender<Result<EntryInfo>>) {
    let result = (|| {
        let views = shared.views.read();
        let view = views.get(&view_id).ok_or(FsearchError::UnknownSearchView(view_id))?;
        let e = view.get_entry(idx).ok_or(FsearchError::EntryNotFound)?;
        Ok(entry_info(&shared.store, &e))
    })();
    if let Ok(info) = &result {
        shared.event_sink.post(EngineEvent::ItemInfoReady { view_id, info: info.clone() });
    }
    let _ = reply.send(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelEventSink;
    use crate::exclude::ExcludeManager as _;
    use crate::include::{Include, SimpleIncludeManager};
    use crate::index::IndexFlags;
    use crate::scanner::Scanner;
    use std::path::Path;
    use std::sync::mpsc as std_mpsc;

    struct NoopExclude;
    impl ExcludeManager for NoopExclude {
        fn matches(&self, _path: &Path) -> bool {
            false
        }
        fn equal(&self, _other: &dyn ExcludeManager) -> bool {
            true
        }
        fn copy(&self) -> Box<dyn ExcludeManager> {
            Box::new(NoopExclude)
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    struct FixedScanner;
    impl Scanner for FixedScanner {
        fn scan(
            &self,
            root: &Arc<Entry>,
            _exclude: &dyn ExcludeManager,
            _flags: IndexFlags,
            _cancel: &CancelToken,
        ) -> (Vec<Arc<Entry>>, Vec<Arc<Entry>>) {
            let a = Entry::new(EntryType::File, "alpha.txt".into(), root, 10, 0);
            let b = Entry::new(EntryType::File, "beta.txt".into(), root, 20, 0);
            (vec![a, b], vec![])
        }
    }

    fn build(dir: &Path) -> (Arc<IndexStore>, WorkQueueOrchestrator) {
        let (tx, _rx) = std_mpsc::channel::<EngineEvent>();
        let sink: Arc<dyn EventSink> = Arc::new(ChannelEventSink(tx));
        let include_mgr = Box::new(SimpleIncludeManager::new(vec![Include {
            path: dir.to_path_buf(),
            id: 1,
            one_file_system: false,
            monitored: false,
            scan_after_launch: false,
        }]));
        let store = Arc::new(IndexStore::with_scanner(
            include_mgr,
            Box::new(NoopExclude),
            IndexFlags::SIZE,
            Arc::clone(&sink),
            Box::new(FixedScanner),
        ));
        let orchestrator =
            WorkQueueOrchestrator::new(Arc::clone(&store), Arc::new(ThreadPool::new(2)), sink);
        (store, orchestrator)
    }

    #[test]
    fn search_then_get_item_info_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let (store, orchestrator) = build(dir.path());

        let include_mgr = Box::new(SimpleIncludeManager::new(vec![Include {
            path: dir.path().to_path_buf(),
            id: 1,
            one_file_system: false,
            monitored: false,
            scan_after_launch: false,
        }]));
        orchestrator.submit(Work::Scan { include_mgr, exclude_mgr: Box::new(NoopExclude) });

        // Give the worker thread a moment; a real embedder would await the
        // ScanFinished event instead of sleeping.
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(store.is_running());

        let view_id = orchestrator.allocate_view_id();
        orchestrator.submit(Work::Search {
            view_id,
            query: Box::new(MatchAll),
            sort_order: SortKey::Name,
            secondary_sort_order: SortKey::None,
            sort_direction: SortDirection::Ascending,
        });
        std::thread::sleep(std::time::Duration::from_millis(50));

        let (reply_tx, reply_rx) = std_mpsc::channel();
        orchestrator.submit(Work::GetItemInfo { view_id, idx: 0, reply: reply_tx });
        let info = reply_rx.recv_timeout(std::time::Duration::from_millis(500)).unwrap().unwrap();
        assert_eq!(info.name, "alpha.txt");

        orchestrator.shutdown();
    }

    #[test]
    fn busy_read_returns_busy_without_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let (store, orchestrator) = build(dir.path());
        let _guard = store.lock_for_test();
        assert!(matches!(orchestrator.try_get_database_info(), Err(FsearchError::Busy)));
    }
}
