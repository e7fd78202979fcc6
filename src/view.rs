use std::collections::HashSet;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::container::EntriesContainer;
use crate::entry::{Entry, EntryType, SortKey};
use crate::query::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// A selection-mutation kind (spec §4.4). For range kinds either endpoint
/// order is accepted; the smaller is used as the start.
#[derive(Debug, Clone, Copy)]
pub enum SelectionMutation {
    Clear,
    All,
    Invert,
    Select(usize),
    Toggle(usize),
    SelectRange(usize, usize),
    ToggleRange(usize, usize),
}

/// A named, persistent result set: a query, two entries containers
/// (folder/file) holding matching entries under a chosen sort key,
/// selection sets, and a sort direction (spec §3/§4.4).
///
/// The containers here are materialized, private copies — never shared
/// with the store's own containers, so a view's sort or selection never
/// disturbs another view or the store. `query` is kept (not just consumed
/// at construction) because live `EntryCreated` reconciliation (spec §4.4)
/// needs to re-evaluate it against entries created long after the view was
/// built.
pub struct SearchView {
    view_id: u32,
    query: Arc<dyn Query>,
    sort_order: SortKey,
    secondary_sort_order: SortKey,
    sort_direction: SortDirection,
    folder_container: EntriesContainer,
    file_container: EntriesContainer,
    file_selection: parking_lot::Mutex<HashSet<usize>>,
    folder_selection: parking_lot::Mutex<HashSet<usize>>,
}

impl SearchView {
    /// Materializes private containers over the supplied entries.
    /// `already_matched` is true when the caller (the work queue, which
    /// parallelises query evaluation across the thread pool per spec
    /// §4.5) has already filtered `files`/`folders` against `query`, so
    /// construction doesn't redundantly re-filter a set that can only come
    /// out the same; a `Sort` rebuild from an existing view's own entries
    /// passes `true` for the same reason.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        view_id: u32,
        query: Arc<dyn Query>,
        files: Vec<Arc<Entry>>,
        folders: Vec<Arc<Entry>>,
        already_matched: bool,
        previous_selection: Option<(&HashSet<usize>, &HashSet<usize>)>,
        sort_order: SortKey,
        secondary_sort_order: SortKey,
        sort_direction: SortDirection,
    ) -> crate::error::Result<Self> {
        let skip_filter = already_matched || query.matches_everything();
        let matched_files: Vec<Arc<Entry>> = if skip_filter {
            files
        } else {
            files.into_iter().filter(|e| query.matches(e)).collect()
        };
        let matched_folders: Vec<Arc<Entry>> = if skip_filter {
            folders
        } else {
            folders.into_iter().filter(|e| query.matches(e)).collect()
        };

        let cancel = CancelToken::new();
        let file_container = EntriesContainer::new(
            matched_files,
            true,
            sort_order,
            secondary_sort_order,
            EntryType::File,
            &cancel,
        )?;
        let folder_container = EntriesContainer::new(
            matched_folders,
            true,
            sort_order,
            secondary_sort_order,
            EntryType::Folder,
            &cancel,
        )?;

        // Reuse a prior selection if supplied; entries not present in the
        // new result are dropped by simply clamping indices to the new
        // bounds at selection time rather than trying to carry forward
        // stale positional indices (positions are not stable identities
        // across a re-sort/re-filter).
        let (file_sel, folder_sel) = match previous_selection {
            Some((f, fo)) => (
                f.iter().copied().filter(|&i| i < file_container.num_entries()).collect(),
                fo.iter().copied().filter(|&i| i < folder_container.num_entries()).collect(),
            ),
            None => (HashSet::new(), HashSet::new()),
        };

        Ok(SearchView {
            view_id,
            query,
            sort_order,
            secondary_sort_order,
            sort_direction,
            folder_container,
            file_container,
            file_selection: parking_lot::Mutex::new(file_sel),
            folder_selection: parking_lot::Mutex::new(folder_sel),
        })
    }

    pub fn view_id(&self) -> u32 {
        self.view_id
    }

    pub fn sort_order(&self) -> SortKey {
        self.sort_order
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction
    }

    pub fn num_files(&self) -> usize {
        self.file_container.num_entries()
    }

    pub fn num_folders(&self) -> usize {
        self.folder_container.num_entries()
    }

    pub fn has_container(&self, c: &EntriesContainer) -> bool {
        std::ptr::eq(&self.folder_container, c) || std::ptr::eq(&self.file_container, c)
    }

    /// This view's matched folders/files in their current sort order, for
    /// re-sorting into a fresh view without re-running the query (spec §4.4
    /// `Sort`: the result set doesn't change, only its order).
    pub fn folder_entries(&self) -> Vec<Arc<Entry>> {
        self.folder_container.joined()
    }

    pub fn file_entries(&self) -> Vec<Arc<Entry>> {
        self.file_container.joined()
    }

    /// Carries a selection across a re-sort or re-filter (spec §4.4).
    pub fn selection_snapshot(&self) -> (HashSet<usize>, HashSet<usize>) {
        (self.file_selection.lock().clone(), self.folder_selection.lock().clone())
    }

    /// Folds the two containers as `[folders…, files…]`, inverting when
    /// direction is `Descending` (spec §4.4).
    pub fn get_entry(&self, idx: usize) -> Option<Arc<Entry>> {
        let total = self.num_folders() + self.num_files();
        if idx >= total {
            return None;
        }
        let effective = match self.sort_direction {
            SortDirection::Ascending => idx,
            SortDirection::Descending => total - 1 - idx,
        };
        if effective < self.num_folders() {
            self.folder_container.get(effective)
        } else {
            self.file_container.get(effective - self.num_folders())
        }
    }

    fn selection_and_pos(&self, idx: usize) -> Option<(bool, usize)> {
        if idx >= self.num_folders() + self.num_files() {
            return None;
        }
        if idx < self.num_folders() {
            Some((true, idx))
        } else {
            Some((false, idx - self.num_folders()))
        }
    }

    pub fn is_selected(&self, e: &Arc<Entry>) -> bool {
        match e.entry_type {
            EntryType::Folder => {
                let joined = self.folder_container.joined();
                if let Some(pos) = joined.iter().position(|x| Arc::ptr_eq(x, e)) {
                    self.folder_selection.lock().contains(&pos)
                } else {
                    false
                }
            }
            EntryType::File => {
                let joined = self.file_container.joined();
                if let Some(pos) = joined.iter().position(|x| Arc::ptr_eq(x, e)) {
                    self.file_selection.lock().contains(&pos)
                } else {
                    false
                }
            }
        }
    }

    pub fn apply_selection(&self, mutation: SelectionMutation) {
        match mutation {
            SelectionMutation::Clear => {
                self.file_selection.lock().clear();
                self.folder_selection.lock().clear();
            }
            SelectionMutation::All => {
                *self.file_selection.lock() = (0..self.num_files()).collect();
                *self.folder_selection.lock() = (0..self.num_folders()).collect();
            }
            SelectionMutation::Invert => {
                let mut fs = self.file_selection.lock();
                *fs = (0..self.num_files()).filter(|i| !fs.contains(i)).collect();
                let mut fos = self.folder_selection.lock();
                *fos = (0..self.num_folders()).filter(|i| !fos.contains(i)).collect();
            }
            SelectionMutation::Select(idx) => {
                if let Some((is_folder, pos)) = self.selection_and_pos(idx) {
                    if is_folder {
                        self.folder_selection.lock().insert(pos);
                    } else {
                        self.file_selection.lock().insert(pos);
                    }
                }
            }
            SelectionMutation::Toggle(idx) => {
                if let Some((is_folder, pos)) = self.selection_and_pos(idx) {
                    let sel = if is_folder {
                        &self.folder_selection
                    } else {
                        &self.file_selection
                    };
                    let mut sel = sel.lock();
                    if !sel.remove(&pos) {
                        sel.insert(pos);
                    }
                }
            }
            SelectionMutation::SelectRange(a, b) => {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                for idx in lo..=hi {
                    self.apply_selection(SelectionMutation::Select(idx));
                }
            }
            SelectionMutation::ToggleRange(a, b) => {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                for idx in lo..=hi {
                    self.apply_selection(SelectionMutation::Toggle(idx));
                }
            }
        }
    }

    pub fn query(&self) -> &Arc<dyn Query> {
        &self.query
    }

    /// Re-evaluates this view's own query against a single newly created
    /// entry and, if matching, inserts it (spec §4.4 reconciliation).
    pub fn reconcile_created(&self, entry: &Arc<Entry>) {
        if !self.query.matches_everything() && !self.query.matches(entry) {
            return;
        }
        match entry.entry_type {
            EntryType::Folder => self.folder_container.insert(entry.clone()),
            EntryType::File => self.file_container.insert(entry.clone()),
        }
    }

    /// Removes `entry` from this view's container and selection,
    /// regardless of whether the store already stole it from its own
    /// container on the same path (spec §4.4: "null out through
    /// `has_container` first to avoid double-free").
    pub fn reconcile_deleted(&self, entry: &Arc<Entry>) {
        let removed = match entry.entry_type {
            EntryType::Folder => self.folder_container.steal(entry),
            EntryType::File => self.file_container.steal(entry),
        };
        if removed {
            // Selection indices shift after a removal; the simplest correct
            // response is to drop the whole selection for that type rather
            // than try to decrement every surviving index, since a stale
            // selection set is worse than an empty one.
            match entry.entry_type {
                EntryType::Folder => self.folder_selection.lock().clear(),
                EntryType::File => self.file_selection.lock().clear(),
            }
        }
    }
}
