use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex as StdMutex};

use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::entry::{Entry, EntryType};
use crate::events::{IndexEvent, IndexEventKind};
use crate::exclude::ExcludeManager;
use crate::include::Include;
use crate::scanner::Scanner;

bitflags::bitflags! {
    /// Property flags (spec §3/§4.6): which attributes a root's entries
    /// carry (and therefore which conditional fields the snapshot codec
    /// writes for them).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IndexFlags: u64 {
        const SIZE = 1 << 0;
        const MODIFICATION_TIME = 1 << 1;
    }
}

/// Per-root index lifecycle (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Created,
    Scanning,
    Ready,
    Monitoring,
    Cancelled,
    Stopped,
}

/// Owns the entries of one configured root; drives initial scan and live
/// monitoring; emits change events (spec §3, §4.2).
pub struct PerRootIndex {
    id: u32,
    include: Include,
    flags: IndexFlags,
    state: Mutex<IndexState>,
    root: Arc<Entry>,
    files: Mutex<Vec<Arc<Entry>>>,
    folders: Mutex<Vec<Arc<Entry>>>,
    refcount: AtomicU32,
    // Guards the index's mutable state against concurrent monitor
    // callbacks (spec §4.2 `lock`/`unlock`). `std::sync::Mutex` rather than
    // `parking_lot` here specifically because `lock()`/`unlock()` are a
    // public pair of operations an external monitor thread calls across an
    // await/callback boundary, and std's guard makes the "forgot to
    // unlock" failure mode a compile error instead of a runtime deadlock
    // when misused from FFI-style callback code.
    callback_guard: StdMutex<()>,
}

impl PerRootIndex {
    pub fn new(id: u32, include: Include, flags: IndexFlags) -> Self {
        let root = Entry::new_root(include.path.to_string_lossy().into_owned(), 0);
        PerRootIndex {
            id,
            include,
            flags,
            state: Mutex::new(IndexState::Created),
            root,
            files: Mutex::new(Vec::new()),
            folders: Mutex::new(Vec::new()),
            refcount: AtomicU32::new(1),
            callback_guard: StdMutex::new(()),
        }
    }

    /// Rehydrates an index from parts already materialized elsewhere — the
    /// snapshot loader builds `root`/`files`/`folders` from the decoded
    /// entry blocks and has no scan to run, so it skips straight to
    /// whatever lifecycle state the caller supplies.
    pub fn from_parts(
        id: u32,
        include: Include,
        flags: IndexFlags,
        root: Arc<Entry>,
        files: Vec<Arc<Entry>>,
        folders: Vec<Arc<Entry>>,
        state: IndexState,
    ) -> Self {
        PerRootIndex {
            id,
            include,
            flags,
            state: Mutex::new(state),
            root,
            files: Mutex::new(files),
            folders: Mutex::new(folders),
            refcount: AtomicU32::new(1),
            callback_guard: StdMutex::new(()),
        }
    }

    pub fn get_id(&self) -> u32 {
        self.id
    }

    pub fn get_flags(&self) -> IndexFlags {
        self.flags
    }

    pub fn include(&self) -> &Include {
        &self.include
    }

    pub fn root(&self) -> &Arc<Entry> {
        &self.root
    }

    pub fn state(&self) -> IndexState {
        *self.state.lock()
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.callback_guard.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `scanner` over the root, populating `files`/`folders`. Returns
    /// `false` (and leaves the index in `Cancelled`) if `cancel` trips
    /// before the scan completes.
    pub fn scan(
        &self,
        scanner: &dyn Scanner,
        exclude: &dyn ExcludeManager,
        cancel: &CancelToken,
        on_event: &dyn Fn(IndexEvent),
    ) -> bool {
        *self.state.lock() = IndexState::Scanning;
        on_event(IndexEvent::bare(IndexEventKind::ScanStarted));

        let (files, folders) = scanner.scan(&self.root, exclude, self.flags, cancel);

        if cancel.is_cancelled() {
            *self.state.lock() = IndexState::Cancelled;
            return false;
        }

        *self.files.lock() = files;
        *self.folders.lock() = folders;
        *self.state.lock() = IndexState::Ready;
        on_event(IndexEvent::bare(IndexEventKind::ScanFinished));
        true
    }

    pub fn start_monitoring(&self, enabled: bool, on_event: &dyn Fn(IndexEvent)) {
        let mut state = self.state.lock();
        if enabled && *state == IndexState::Ready {
            *state = IndexState::Monitoring;
            drop(state);
            on_event(IndexEvent::bare(IndexEventKind::MonitoringStarted));
        } else if !enabled && *state == IndexState::Monitoring {
            *state = IndexState::Ready;
            drop(state);
            on_event(IndexEvent::bare(IndexEventKind::MonitoringFinished));
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.state() == IndexState::Monitoring
    }

    pub fn get_files(&self) -> Vec<Arc<Entry>> {
        self.files.lock().clone()
    }

    pub fn get_folders(&self) -> Vec<Arc<Entry>> {
        self.folders.lock().clone()
    }

    /// Registers a newly created entry under this index's pool (called by
    /// the store after the corresponding event bracket), keeping the
    /// per-index pool authoritative over entry lifetime even though the
    /// store's containers hold the sorted references.
    pub fn adopt_created(&self, entry: Arc<Entry>) {
        match entry.entry_type {
            EntryType::File => self.files.lock().push(entry),
            EntryType::Folder => self.folders.lock().push(entry),
        }
    }

    pub fn remove_entry(&self, entry: &Arc<Entry>) {
        match entry.entry_type {
            EntryType::File => self.files.lock().retain(|e| !Arc::ptr_eq(e, entry)),
            EntryType::Folder => self.folders.lock().retain(|e| !Arc::ptr_eq(e, entry)),
        }
    }

    pub fn ref_(&self) -> u32 {
        self.refcount.fetch_add(1, AtomicOrdering::AcqRel) + 1
    }

    /// Returns the new refcount; `0` means this was the last reference and
    /// the index transitions to `Stopped`.
    pub fn unref(&self) -> u32 {
        let prev = self.refcount.fetch_sub(1, AtomicOrdering::AcqRel);
        if prev == 1 {
            *self.state.lock() = IndexState::Stopped;
        }
        prev - 1
    }
}

impl std::fmt::Debug for PerRootIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerRootIndex")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("path", &self.include.path)
            .finish()
    }
}
