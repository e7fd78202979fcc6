//! Cross-module scenarios from the engine's end-to-end spec, exercised
//! through the public API the way an embedder would use it: submit `Work`,
//! wait for the corresponding event, then read back through a view.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use fsearch_engine::{
    CancelToken, ChannelEventSink, EngineEvent, Entry, EntryType, ExcludeManager, GitignoreExcludeManager,
    Include, IndexFlags, IndexStore, MatchAll, NameGlob, Scanner, SortDirection, SortKey,
    ThreadPool, Work, WorkQueueOrchestrator,
};

struct FixedScanner {
    folders: Vec<&'static str>,
    files: Vec<&'static str>,
}

impl Scanner for FixedScanner {
    fn scan(
        &self,
        root: &Arc<Entry>,
        _exclude: &dyn ExcludeManager,
        _flags: IndexFlags,
        _cancel: &CancelToken,
    ) -> (Vec<Arc<Entry>>, Vec<Arc<Entry>>) {
        let folders = self
            .folders
            .iter()
            .map(|n| Entry::new(EntryType::Folder, n.to_string(), root, 0, 0))
            .collect();
        let files = self
            .files
            .iter()
            .map(|n| Entry::new(EntryType::File, n.to_string(), root, 0, 0))
            .collect();
        (files, folders)
    }
}

fn build_store(scanner: FixedScanner, dir: &std::path::Path) -> Arc<IndexStore> {
    let (tx, _rx) = mpsc::channel::<EngineEvent>();
    let include_mgr = fsearch_engine::SimpleIncludeManager::new(vec![Include {
        path: dir.to_path_buf(),
        id: 1,
        one_file_system: false,
        monitored: false,
        scan_after_launch: false,
    }]);
    Arc::new(IndexStore::with_scanner(
        Box::new(include_mgr),
        Box::new(GitignoreExcludeManager::empty()),
        IndexFlags::SIZE | IndexFlags::MODIFICATION_TIME,
        Arc::new(ChannelEventSink(tx)),
        Box::new(scanner),
    ))
}

fn wait_for<F: Fn() -> bool>(check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("condition never became true within timeout");
}

/// Scenario 1: empty search over a single root returns folders before
/// files under Name/Ascending.
#[test]
fn empty_query_search_orders_folders_before_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = build_store(
        FixedScanner { folders: vec!["d"], files: vec!["a.txt", "b.txt"] },
        dir.path(),
    );
    store.start(&CancelToken::new()).unwrap();

    let (tx, _rx) = mpsc::channel::<EngineEvent>();
    let orchestrator =
        WorkQueueOrchestrator::new(Arc::clone(&store), Arc::new(ThreadPool::new(2)), Arc::new(ChannelEventSink(tx)));
    let view_id = orchestrator.allocate_view_id();
    orchestrator.submit(Work::Search {
        view_id,
        query: Box::new(MatchAll),
        sort_order: SortKey::Name,
        secondary_sort_order: SortKey::None,
        sort_direction: SortDirection::Ascending,
    });

    wait_for(|| orchestrator.try_get_search_info(view_id).is_ok());
    let info = orchestrator.try_get_search_info(view_id).unwrap();
    assert_eq!(info.num_files, 2);
    assert_eq!(info.num_folders, 1);

    let item0 = orchestrator.try_get_item_info(view_id, 0).unwrap();
    assert_eq!(item0.name, "d");
    assert!(item0.is_folder);
    let item1 = orchestrator.try_get_item_info(view_id, 1).unwrap();
    assert_eq!(item1.name, "a.txt");
    let item2 = orchestrator.try_get_item_info(view_id, 2).unwrap();
    assert_eq!(item2.name, "b.txt");

    orchestrator.shutdown();
}

/// Scenario 4: issuing the same `Scan` config twice is a no-op the second
/// time — only one pair of `scan-started`/`scan-finished` events fires.
#[test]
fn repeated_scan_with_identical_config_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::channel::<EngineEvent>();
    let include_mgr = fsearch_engine::SimpleIncludeManager::new(vec![Include {
        path: dir.path().to_path_buf(),
        id: 1,
        one_file_system: false,
        monitored: false,
        scan_after_launch: false,
    }]);
    let store = Arc::new(IndexStore::with_scanner(
        Box::new(include_mgr),
        Box::new(GitignoreExcludeManager::empty()),
        IndexFlags::SIZE,
        Arc::new(ChannelEventSink(tx.clone())),
        Box::new(FixedScanner { folders: vec![], files: vec!["only.txt"] }),
    ));
    // `Scan`'s started/finished events are published by the orchestrator,
    // not the store itself, so both share the same sink here to observe
    // them on one channel.
    let orchestrator = WorkQueueOrchestrator::new(
        Arc::clone(&store),
        Arc::new(ThreadPool::new(2)),
        Arc::new(ChannelEventSink(tx)),
    );

    let make_cfg = || {
        (
            Box::new(fsearch_engine::SimpleIncludeManager::new(vec![Include {
                path: dir.path().to_path_buf(),
                id: 1,
                one_file_system: false,
                monitored: false,
                scan_after_launch: false,
            }])) as Box<dyn fsearch_engine::IncludeManager>,
            Box::new(GitignoreExcludeManager::empty()) as Box<dyn ExcludeManager>,
        )
    };

    let (im1, em1) = make_cfg();
    orchestrator.submit(Work::Scan { include_mgr: im1, exclude_mgr: em1 });
    wait_for(|| store.is_running());

    let (im2, em2) = make_cfg();
    orchestrator.submit(Work::Scan { include_mgr: im2, exclude_mgr: em2 });
    // Give the second Scan a chance to be processed (or skipped) before
    // asserting on the event stream.
    std::thread::sleep(Duration::from_millis(100));

    let events: Vec<EngineEvent> = rx.try_iter().collect();
    let scan_starts = events.iter().filter(|e| matches!(e, EngineEvent::ScanStarted)).count();
    let scan_finishes = events.iter().filter(|e| matches!(e, EngineEvent::ScanFinished(_))).count();
    assert_eq!(scan_starts, 1);
    assert_eq!(scan_finishes, 1);

    orchestrator.shutdown();
}

/// Scenario 5: Name/Descending inverts folder-then-file positional order.
#[test]
fn sort_descending_inverts_positional_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = build_store(FixedScanner { folders: vec![], files: vec!["a", "b", "c"] }, dir.path());
    store.start(&CancelToken::new()).unwrap();

    let (tx, _rx) = mpsc::channel::<EngineEvent>();
    let orchestrator =
        WorkQueueOrchestrator::new(Arc::clone(&store), Arc::new(ThreadPool::new(2)), Arc::new(ChannelEventSink(tx)));
    let view_id = orchestrator.allocate_view_id();
    orchestrator.submit(Work::Search {
        view_id,
        query: Box::new(NameGlob::new("*")),
        sort_order: SortKey::Name,
        secondary_sort_order: SortKey::None,
        sort_direction: SortDirection::Descending,
    });
    wait_for(|| orchestrator.try_get_search_info(view_id).is_ok());

    assert_eq!(orchestrator.try_get_item_info(view_id, 0).unwrap().name, "c");
    assert_eq!(orchestrator.try_get_item_info(view_id, 2).unwrap().name, "a");

    orchestrator.shutdown();
}

/// A scanner that blocks until released, so a test can observe the store
/// mid-`start()` — the window during which it holds its structural mutex.
struct BlockingScanner {
    release: std::sync::mpsc::Receiver<()>,
}

impl Scanner for BlockingScanner {
    fn scan(
        &self,
        root: &Arc<Entry>,
        _exclude: &dyn ExcludeManager,
        _flags: IndexFlags,
        _cancel: &CancelToken,
    ) -> (Vec<Arc<Entry>>, Vec<Arc<Entry>>) {
        let _ = self.release.recv();
        let _ = root;
        (Vec::new(), Vec::new())
    }
}

/// Scenario 6: holding the store's structural mutex makes every
/// non-blocking `try_get_*` fail with `Busy` instead of blocking.
#[test]
fn busy_store_fails_non_blocking_reads_without_blocking() {
    let dir = tempfile::tempdir().unwrap();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (event_tx, _event_rx) = mpsc::channel::<EngineEvent>();
    let include_mgr = fsearch_engine::SimpleIncludeManager::new(vec![Include {
        path: dir.path().to_path_buf(),
        id: 1,
        one_file_system: false,
        monitored: false,
        scan_after_launch: false,
    }]);
    let store = Arc::new(IndexStore::with_scanner(
        Box::new(include_mgr),
        Box::new(GitignoreExcludeManager::empty()),
        IndexFlags::SIZE,
        Arc::new(ChannelEventSink(event_tx)),
        Box::new(BlockingScanner { release: release_rx }),
    ));

    let store_for_scan = Arc::clone(&store);
    let scan_thread = std::thread::spawn(move || {
        store_for_scan.start(&CancelToken::new()).unwrap();
    });

    // Give `start()` a moment to acquire its structural lock and block
    // inside the scanner.
    std::thread::sleep(Duration::from_millis(50));

    let (tx, _rx) = mpsc::channel::<EngineEvent>();
    let orchestrator =
        WorkQueueOrchestrator::new(Arc::clone(&store), Arc::new(ThreadPool::new(2)), Arc::new(ChannelEventSink(tx)));

    let started = std::time::Instant::now();
    let result = orchestrator.try_get_database_info();
    assert!(started.elapsed() < Duration::from_millis(50));
    assert!(matches!(result, Err(fsearch_engine::FsearchError::Busy)));

    release_tx.send(()).unwrap();
    scan_thread.join().unwrap();
    orchestrator.shutdown();
}
