use std::sync::Arc;

use crate::entry::Entry;

/// Per-root index event kinds (spec §4.2). `StartModifying`/`EndModifying`
/// bracket a batch of mutations so a consumer can take a consistent
/// snapshot; exactly one store lock is held by the consumer for the
/// duration of the bracket.
#[derive(Debug, Clone)]
pub enum IndexEventKind {
    ScanStarted,
    ScanFinished,
    MonitoringStarted,
    MonitoringFinished,
    EntryCreated,
    EntryDeleted,
    EntryRenamed,
    EntryMoved,
    EntryChanged,
    EntryAttributeChanged,
    StartModifying,
    EndModifying,
}

#[derive(Debug, Clone)]
pub struct IndexEvent {
    pub kind: IndexEventKind,
    pub folders: Vec<Arc<Entry>>,
    pub files: Vec<Arc<Entry>>,
}

impl IndexEvent {
    pub fn bare(kind: IndexEventKind) -> Self {
        IndexEvent {
            kind,
            folders: Vec::new(),
            files: Vec::new(),
        }
    }
}

/// Summary counts published alongside `*-finished` events.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct DatabaseInfo {
    pub num_folders: u64,
    pub num_files: u64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SearchInfo {
    pub view_id: u32,
    pub num_folders: u64,
    pub num_files: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EntryInfo {
    pub path: String,
    pub name: String,
    pub is_folder: bool,
    pub size: u64,
    pub mtime: i64,
    pub extension: String,
}

/// Events published asynchronously to the embedder (spec §6). Delivery is
/// ordered: the engine posts these to whatever dispatcher the embedder
/// supplies (see [`EventSink`]), never calling back into engine state while
/// holding the store mutex.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    LoadStarted,
    LoadFinished(DatabaseInfo),
    SaveStarted,
    SaveFinished,
    ScanStarted,
    ScanFinished(DatabaseInfo),
    SearchStarted { view_id: u32 },
    SearchFinished(SearchInfo),
    SortStarted { view_id: u32 },
    SortFinished(SearchInfo),
    SelectionChanged { view_id: u32, info: SearchInfo },
    DatabaseChanged(DatabaseInfo),
    ItemInfoReady { view_id: u32, info: EntryInfo },
}

/// Where the engine posts [`EngineEvent`]s. The spec only requires
/// asynchronous, ordered delivery, not any particular loop implementation;
/// a channel sender satisfies both, and it's what this repo already uses to
/// hand events out of its filesystem-watcher thread.
pub trait EventSink: Send + Sync {
    fn post(&self, event: EngineEvent);
}

/// `EventSink` over a standard MPSC channel. The "idle queue" the design
/// notes mention is whatever the embedder drains the receiving end on.
pub struct ChannelEventSink(pub std::sync::mpsc::Sender<EngineEvent>);

impl EventSink for ChannelEventSink {
    fn post(&self, event: EngineEvent) {
        let _ = self.0.send(event);
    }
}
