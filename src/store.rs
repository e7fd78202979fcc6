use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};
use std::sync::mpsc;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cancel::CancelToken;
use crate::container::EntriesContainer;
use crate::entry::{Entry, EntryType, SortKey, FAST_SORT_KEYS};
use crate::events::{DatabaseInfo, EngineEvent, EventSink};
use crate::exclude::ExcludeManager;
use crate::include::IncludeManager;
use crate::index::{IndexFlags, PerRootIndex};
use crate::log::perf_log;
use crate::monitor::{Monitor, NotifyMonitor, RawFsEvent};
use crate::scanner::{Scanner, WalkDirScanner};
use crate::view::SearchView;

const NEGATIVE_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(60);
const MAX_NEGATIVE_CACHE: usize = 512;

struct NegativeNameEntry {
    query_lower: String,
    created_at: std::time::Instant,
}

/// Small bounded, TTL'd record of query strings that recently matched
/// nothing, so a caller refining that same query doesn't pay for a full
/// parallel match pass just to confirm it's still empty (§B, mirrors the
/// original `negative_name_cache`/`prune_negative_name_cache`).
#[derive(Default)]
struct NegativeNameCache {
    entries: Vec<NegativeNameEntry>,
}

impl NegativeNameCache {
    fn prune(&mut self) {
        let now = std::time::Instant::now();
        self.entries.retain(|e| now.duration_since(e.created_at) <= NEGATIVE_CACHE_TTL);
    }

    /// True if `query_lower` is known empty because some previously-remembered
    /// empty query is a substring of it (narrowing a substring match can only
    /// shrink the result set).
    fn lookup(&mut self, query_lower: &str) -> bool {
        self.prune();
        self.entries.iter().any(|e| query_lower.contains(&e.query_lower))
    }

    fn remember(&mut self, query_lower: &str) {
        self.prune();
        if self.entries.iter().any(|e| e.query_lower == query_lower) {
            return;
        }
        self.entries.push(NegativeNameEntry {
            query_lower: query_lower.to_string(),
            created_at: std::time::Instant::now(),
        });
        if self.entries.len() > MAX_NEGATIVE_CACHE {
            let drop_count = self.entries.len() - MAX_NEGATIVE_CACHE;
            self.entries.drain(0..drop_count);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Aggregates multiple per-root indices; maintains, per supported sort key,
/// one folder container and one file container spanning all roots (spec
/// §3/§4.3).
pub struct IndexStore {
    indices: RwLock<Vec<Arc<PerRootIndex>>>,
    folder_containers: RwLock<HashMap<SortKey, Arc<EntriesContainer>>>,
    file_containers: RwLock<HashMap<SortKey, Arc<EntriesContainer>>>,
    include_mgr: RwLock<Box<dyn IncludeManager>>,
    exclude_mgr: RwLock<Box<dyn ExcludeManager>>,
    flags: IndexFlags,
    is_sorted: AtomicBool,
    running: AtomicBool,
    refcount: AtomicU32,
    event_sink: Arc<dyn EventSink>,
    scanner: Box<dyn Scanner>,
    next_index_id: AtomicU32,
    negative_cache: parking_lot::Mutex<NegativeNameCache>,
    // Serializes structural mutation (start/remove/add): "only one
    // structural mutation is in progress at a time" (spec §4.3). This is
    // the store mutex the design refers to elsewhere; reads via
    // get_files/get_folders never take it, only structural writers do.
    structural: parking_lot::Mutex<()>,
    // Weak references so the store never extends a view's lifetime past
    // the orchestrator's own `Arc` for it (spec §4.4 reconciliation).
    views: RwLock<Vec<std::sync::Weak<SearchView>>>,
}

impl IndexStore {
    pub fn new(
        include_mgr: Box<dyn IncludeManager>,
        exclude_mgr: Box<dyn ExcludeManager>,
        flags: IndexFlags,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self::with_scanner(include_mgr, exclude_mgr, flags, event_sink, Box::new(WalkDirScanner))
    }

    /// Same as [`IndexStore::new`] but with an explicit [`Scanner`],
    /// for embedders supplying their own and for tests exercising the
    /// store without touching the real filesystem.
    pub fn with_scanner(
        include_mgr: Box<dyn IncludeManager>,
        exclude_mgr: Box<dyn ExcludeManager>,
        flags: IndexFlags,
        event_sink: Arc<dyn EventSink>,
        scanner: Box<dyn Scanner>,
    ) -> Self {
        IndexStore {
            indices: RwLock::new(Vec::new()),
            folder_containers: RwLock::new(HashMap::new()),
            file_containers: RwLock::new(HashMap::new()),
            include_mgr: RwLock::new(include_mgr),
            exclude_mgr: RwLock::new(exclude_mgr),
            flags,
            is_sorted: AtomicBool::new(false),
            running: AtomicBool::new(false),
            refcount: AtomicU32::new(1),
            event_sink,
            scanner,
            next_index_id: AtomicU32::new(1),
            negative_cache: parking_lot::Mutex::new(NegativeNameCache::default()),
            structural: parking_lot::Mutex::new(()),
            views: RwLock::new(Vec::new()),
        }
    }

    /// Registers a view so live monitor events reach it (spec §4.4). Also
    /// prunes any dead weak references opportunistically.
    pub fn register_view(&self, view: &Arc<SearchView>) {
        let mut views = self.views.write();
        views.retain(|w| w.strong_count() > 0);
        views.push(Arc::downgrade(view));
    }

    /// Re-evaluates `created` and `removed` against every still-live
    /// registered view (spec §4.4 `reconcile_created`/`reconcile_deleted`).
    fn reconcile_views(&self, created: &[Arc<Entry>], removed: &[Arc<Entry>]) {
        let views = self.views.read();
        for weak in views.iter() {
            let Some(view) = weak.upgrade() else { continue };
            for e in created {
                view.reconcile_created(e);
            }
            for e in removed {
                view.reconcile_deleted(e);
            }
        }
    }

    /// Looks up `query_lower` in the negative-name cache (spec SPEC_FULL.md
    /// §B): true if some previously-remembered empty query is a substring of
    /// it, so the caller can skip a full parallel match pass.
    pub fn negative_cache_lookup(&self, query_lower: &str) -> bool {
        self.negative_cache.lock().lookup(query_lower)
    }

    /// Remembers that `query_lower` matched nothing.
    pub fn negative_cache_remember(&self, query_lower: &str) {
        self.negative_cache.lock().remember(query_lower);
    }

    pub fn flags(&self) -> IndexFlags {
        self.flags
    }

    pub fn is_sorted(&self) -> bool {
        self.is_sorted.load(AtomicOrdering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(AtomicOrdering::Acquire)
    }

    pub fn config_equals(&self, include: &dyn IncludeManager, exclude: &dyn ExcludeManager) -> bool {
        self.include_mgr.read().equal(include) && self.exclude_mgr.read().equal(exclude)
    }

    /// True while a structural mutation (`start`/`restore`/`reset`) is in
    /// flight — the "store mutex is held" condition the work queue's
    /// non-blocking `try_get_*` reads bail out on with `Busy`.
    pub fn is_busy(&self) -> bool {
        self.structural.is_locked()
    }

    #[cfg(test)]
    pub fn lock_for_test(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.structural.lock()
    }

    /// Swaps in a new configuration ahead of a `Scan` (spec §4.5). Does not
    /// itself trigger a re-scan; callers compare against the old
    /// configuration via `config_equals` first if they want the "config
    /// unchanged" no-op behavior.
    pub fn reconfigure(&self, include_mgr: Box<dyn IncludeManager>, exclude_mgr: Box<dyn ExcludeManager>) {
        *self.include_mgr.write() = include_mgr;
        *self.exclude_mgr.write() = exclude_mgr;
    }

    /// Discards every index and container, returning the store to its
    /// pre-`start` state, for `Rescan` (spec §4.5): a rescan must re-walk
    /// every configured root even if its id is already present, unlike
    /// `start`'s "skip already-known ids" merge.
    pub fn reset(&self) {
        let _guard = self.structural.lock();
        self.indices.write().clear();
        self.folder_containers.write().clear();
        self.file_containers.write().clear();
        self.is_sorted.store(false, AtomicOrdering::Release);
        self.running.store(false, AtomicOrdering::Release);
        self.negative_cache.lock().clear();
    }

    /// For each include descriptor whose flags are a superset of the store
    /// flags and whose id is not already present, builds a per-root index,
    /// scans it, and merges its files/folders into the store's name-sorted
    /// containers. Then builds the remaining sort containers for both
    /// types by re-sorting the joined sequences (spec §4.3).
    ///
    /// On cancellation, discards all partial state and leaves the store
    /// empty with `running = false`.
    pub fn start(&self, cancel: &CancelToken) -> crate::error::Result<()> {
        let _guard = self.structural.lock();
        let t0 = std::time::Instant::now();

        let includes = self.include_mgr.read().get_includes();
        let existing_ids: std::collections::HashSet<u32> =
            self.indices.read().iter().map(|i| i.get_id()).collect();

        let mut all_files: Vec<Arc<Entry>> = Vec::new();
        let mut all_folders: Vec<Arc<Entry>> = Vec::new();
        let mut new_indices = Vec::new();

        for include in includes {
            if existing_ids.contains(&include.get_id()) {
                continue;
            }
            let idx = Arc::new(PerRootIndex::new(include.get_id(), include.clone(), self.flags));
            let exclude_mgr = self.exclude_mgr.read();
            let ok = idx.scan(self.scanner.as_ref(), exclude_mgr.as_ref(), cancel, &|_e| {});
            drop(exclude_mgr);
            if !ok || cancel.is_cancelled() {
                perf_log("store_start cancelled, discarding partial state");
                self.running.store(false, AtomicOrdering::Release);
                return Err(crate::error::FsearchError::Cancelled);
            }
            all_folders.push(idx.root().clone());
            all_folders.extend(idx.get_folders());
            all_files.extend(idx.get_files());
            new_indices.push(idx);
        }

        if cancel.is_cancelled() {
            self.running.store(false, AtomicOrdering::Release);
            return Err(crate::error::FsearchError::Cancelled);
        }

        // Build the Name containers first (spec: "merge ... into the
        // store's name-sorted containers"), then the rest by re-sorting
        // the joined sequence — cheaper than an independent scan/merge per
        // key, and mirrors how a single full rebuild naturally produces
        // every ordering from one flat sequence.
        let mut folder_containers = HashMap::new();
        let mut file_containers = HashMap::new();

        for key in FAST_SORT_KEYS {
            if cancel.is_cancelled() {
                self.running.store(false, AtomicOrdering::Release);
                return Err(crate::error::FsearchError::Cancelled);
            }
            let fc = EntriesContainer::new(
                all_folders.clone(),
                true,
                key,
                SortKey::None,
                EntryType::Folder,
                cancel,
            )?;
            let filec = EntriesContainer::new(
                all_files.clone(),
                true,
                key,
                SortKey::None,
                EntryType::File,
                cancel,
            )?;
            folder_containers.insert(key, Arc::new(fc));
            file_containers.insert(key, Arc::new(filec));
        }

        *self.folder_containers.write() = folder_containers;
        *self.file_containers.write() = file_containers;
        self.indices.write().extend(new_indices);
        self.is_sorted.store(true, AtomicOrdering::Release);
        self.running.store(true, AtomicOrdering::Release);
        self.negative_cache.lock().clear();

        perf_log(format!(
            "store_start indices={} folders={} files={} elapsed={}ms",
            self.indices.read().len(),
            all_folders.len(),
            all_files.len(),
            t0.elapsed().as_millis()
        ));
        Ok(())
    }

    /// Enables filesystem monitoring on every member index, spawning a
    /// dedicated watcher thread per index that debounces incoming events
    /// (spec §4.2/§5, `WATCH_DEBOUNCE`) before applying them as one
    /// `StartModifying..EndModifying` bracket.
    pub fn start_monitoring(self: &Arc<Self>, debounce: std::time::Duration) {
        let indices = self.indices.read().clone();
        for idx in indices {
            if idx.is_monitoring() {
                continue;
            }
            idx.start_monitoring(true, &|_e| {});
            let store = Arc::clone(self);
            let root_path = std::path::PathBuf::from(idx.root().path());
            std::thread::Builder::new()
                .name(format!("fsearch-monitor-{}", idx.get_id()))
                .spawn(move || {
                    let (tx, rx) = mpsc::channel::<RawFsEvent>();
                    let mut monitor = NotifyMonitor::default();
                    if let Err(e) = monitor.watch(&root_path, tx) {
                        perf_log(format!("monitor_start_failed id={} err={}", idx.get_id(), e));
                        return;
                    }
                    let mut pending: Vec<RawFsEvent> = Vec::new();
                    loop {
                        match rx.recv_timeout(debounce) {
                            Ok(ev) => {
                                pending.push(ev);
                                while let Ok(more) = rx.try_recv() {
                                    pending.push(more);
                                }
                            }
                            Err(mpsc::RecvTimeoutError::Timeout) => {}
                            Err(mpsc::RecvTimeoutError::Disconnected) => break,
                        }
                        if !pending.is_empty() {
                            let batch = std::mem::take(&mut pending);
                            store.apply_monitor_batch(&idx, batch);
                        }
                    }
                })
                .expect("failed to spawn monitor thread");
        }
    }

    /// Applies a debounced batch of raw filesystem events for `idx`,
    /// bracketed by `StartModifying..EndModifying` (spec §4.2), mutating
    /// both the owning index's pool and every maintained store container,
    /// then publishing `database-changed`.
    fn apply_monitor_batch(self: &Arc<Self>, idx: &Arc<PerRootIndex>, batch: Vec<RawFsEvent>) {
        let _held = idx.lock();
        let mut created_files = Vec::new();
        let mut created_folders = Vec::new();
        let mut removed_paths = Vec::new();

        for ev in batch {
            match ev {
                RawFsEvent::Created(path) | RawFsEvent::AttributeChanged(path) => {
                    let is_dir = path.is_dir();
                    let Ok(meta) = std::fs::symlink_metadata(&path) else {
                        continue;
                    };
                    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned())
                    else {
                        continue;
                    };
                    let mtime = meta
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                        .map(|d| d.as_secs() as i64)
                        .unwrap_or(0);
                    let entry_type = if is_dir { EntryType::Folder } else { EntryType::File };
                    let entry = Entry::new(entry_type, name, idx.root(), meta.len(), mtime);
                    match entry_type {
                        EntryType::Folder => created_folders.push(entry),
                        EntryType::File => created_files.push(entry),
                    }
                }
                RawFsEvent::Removed(path) => removed_paths.push(path),
                RawFsEvent::Renamed { to, .. } => {
                    if let Ok(meta) = std::fs::symlink_metadata(&to) {
                        if let Some(name) = to.file_name().map(|n| n.to_string_lossy().into_owned())
                        {
                            let entry_type = if meta.is_dir() { EntryType::Folder } else { EntryType::File };
                            let entry = Entry::new(entry_type, name, idx.root(), meta.len(), 0);
                            match entry_type {
                                EntryType::Folder => created_folders.push(entry),
                                EntryType::File => created_files.push(entry),
                            }
                        }
                    }
                }
                RawFsEvent::RescanRequired(_) => {}
            }
        }

        // Resolve each removed path to the live entry still held in the
        // index's own pools before anything is stolen, since a path no
        // longer exists on disk by the time this batch is applied.
        let removed_entries: Vec<Arc<Entry>> = removed_paths
            .iter()
            .filter_map(|path| {
                let path_str = path.to_string_lossy().into_owned();
                idx.get_folders()
                    .into_iter()
                    .chain(idx.get_files())
                    .find(|e| e.path() == path_str)
            })
            .collect();

        if created_files.is_empty() && created_folders.is_empty() && removed_entries.is_empty() {
            return;
        }

        let mut created_entries = Vec::with_capacity(created_folders.len() + created_files.len());

        for f in created_folders {
            idx.adopt_created(f.clone());
            self.add_entries(&[f.clone()], true);
            created_entries.push(f);
        }
        for f in created_files {
            idx.adopt_created(f.clone());
            self.add_entries(&[f.clone()], false);
            created_entries.push(f);
        }
        for e in &removed_entries {
            self.remove_entry(e, idx);
        }

        self.reconcile_views(&created_entries, &removed_entries);

        self.event_sink.post(EngineEvent::DatabaseChanged(DatabaseInfo {
            num_folders: self.num_folders() as u64,
            num_files: self.num_files() as u64,
        }));
    }

    pub fn num_files(&self) -> usize {
        self.file_containers
            .read()
            .get(&SortKey::Name)
            .map(|c| c.num_entries())
            .unwrap_or(0)
    }

    pub fn num_folders(&self) -> usize {
        self.folder_containers
            .read()
            .get(&SortKey::Name)
            .map(|c| c.num_entries())
            .unwrap_or(0)
    }

    pub fn num_fast_sort_indices(&self) -> usize {
        self.folder_containers.read().len()
    }

    pub fn get_files(&self, key: SortKey) -> Option<Arc<EntriesContainer>> {
        if !self.is_sorted() {
            return None;
        }
        self.file_containers.read().get(&key).cloned()
    }

    pub fn get_folders(&self, key: SortKey) -> Option<Arc<EntriesContainer>> {
        if !self.is_sorted() {
            return None;
        }
        self.folder_containers.read().get(&key).cloned()
    }

    /// Sum of every file's size whose ancestor chain passes through
    /// `folder` (spec `ItemInfo` synthesis, §B: recursive folder size).
    /// Walks every file once; fine for an on-demand detail view, not meant
    /// for a hot path.
    pub fn recursive_folder_size(&self, folder: &Arc<Entry>) -> u64 {
        let Some(files) = self.get_files(SortKey::Name) else {
            return 0;
        };
        files
            .joined()
            .iter()
            .filter(|f| {
                let mut cur = f.parent();
                while let Some(p) = cur {
                    if Arc::ptr_eq(&p, folder) {
                        return true;
                    }
                    cur = p.parent();
                }
                false
            })
            .map(|f| f.size)
            .sum()
    }

    pub fn has_container(&self, c: &Arc<EntriesContainer>) -> bool {
        self.folder_containers
            .read()
            .values()
            .any(|x| Arc::ptr_eq(x, c))
            || self.file_containers.read().values().any(|x| Arc::ptr_eq(x, c))
    }

    pub fn remove_entry(&self, e: &Arc<Entry>, index: &Arc<PerRootIndex>) {
        assert!(
            self.indices.read().iter().any(|i| Arc::ptr_eq(i, index)),
            "index not a member of this store"
        );
        match e.entry_type {
            EntryType::Folder => {
                for c in self.folder_containers.read().values() {
                    c.steal(e);
                }
            }
            EntryType::File => {
                for c in self.file_containers.read().values() {
                    c.steal(e);
                }
            }
        }
        index.remove_entry(e);
    }

    pub fn remove_folders(&self, arr: &[Arc<Entry>], index: &Arc<PerRootIndex>) {
        for e in arr {
            self.remove_entry(e, index);
        }
    }

    pub fn remove_files(&self, arr: &[Arc<Entry>], index: &Arc<PerRootIndex>) {
        for e in arr {
            self.remove_entry(e, index);
        }
    }

    pub fn add_entries(&self, arr: &[Arc<Entry>], is_folder: bool) {
        let containers = if is_folder {
            self.folder_containers.read()
        } else {
            self.file_containers.read()
        };
        for c in containers.values() {
            for e in arr {
                c.insert(e.clone());
            }
        }
    }

    /// Installs state decoded from a snapshot file (spec §4.6) in one shot,
    /// bypassing `start`'s scan — the snapshot already carries every
    /// container in sorted order. Structural-mutation-exclusive, same as
    /// `start`.
    pub fn restore(
        &self,
        indices: Vec<Arc<PerRootIndex>>,
        folder_containers: HashMap<SortKey, Arc<EntriesContainer>>,
        file_containers: HashMap<SortKey, Arc<EntriesContainer>>,
    ) {
        let _guard = self.structural.lock();
        *self.folder_containers.write() = folder_containers;
        *self.file_containers.write() = file_containers;
        *self.indices.write() = indices;
        self.is_sorted.store(true, AtomicOrdering::Release);
        self.running.store(true, AtomicOrdering::Release);
        self.negative_cache.lock().clear();
    }

    pub fn indices(&self) -> Vec<Arc<PerRootIndex>> {
        self.indices.read().clone()
    }

    pub fn allocate_index_id(&self) -> u32 {
        self.next_index_id.fetch_add(1, AtomicOrdering::AcqRel)
    }

    pub fn ref_(&self) -> u32 {
        self.refcount.fetch_add(1, AtomicOrdering::AcqRel) + 1
    }

    pub fn unref(&self) -> u32 {
        self.refcount.fetch_sub(1, AtomicOrdering::AcqRel) - 1
    }
}
