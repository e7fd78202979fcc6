use std::cmp::Ordering;
use std::sync::{Arc, Weak};

/// `File` or `Folder`. Folders may be a parent; files never are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    File,
    Folder,
}

/// Key a container (or a search view's containers) is ordered under.
/// `None` is only meaningful as a *secondary* key — it means "no secondary
/// key, ties fall to identity order".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    Name,
    Path,
    Size,
    ModificationTime,
    Extension,
    None,
}

/// All sort keys a store maintains fast containers for (spec §3, "at
/// minimum"). `None` is excluded — it is never a primary key for a store
/// container, only a valid secondary.
pub const FAST_SORT_KEYS: [SortKey; 5] = [
    SortKey::Name,
    SortKey::Path,
    SortKey::Size,
    SortKey::ModificationTime,
    SortKey::Extension,
];

/// One file or folder. Immutable identity; `idx` is a scratch slot refreshed
/// immediately before each snapshot write (spec §3).
///
/// `parent` is a weak reference into the owning index's folder pool: a
/// folder's children must not keep it alive past the index's own lifetime,
/// matching the arena-plus-index ownership the design notes call for
/// ("use arena+index rather than raw pointers").
#[derive(Debug)]
pub struct Entry {
    pub entry_type: EntryType,
    pub name: String,
    pub parent: Option<Weak<Entry>>,
    pub size: u64,
    pub mtime: i64,
    /// Position in the name-sorted container of its type; refreshed before
    /// each snapshot pass, otherwise treated as stale scratch state.
    pub idx: std::sync::atomic::AtomicU32,
}

impl Entry {
    pub fn new_root(name: String, mtime: i64) -> Arc<Entry> {
        Self::new_root_with_size(name, 0, mtime)
    }

    /// Same as [`Entry::new_root`] but with an explicit size, used when
    /// rehydrating a root folder from a snapshot that already recorded one.
    pub fn new_root_with_size(name: String, size: u64, mtime: i64) -> Arc<Entry> {
        Arc::new(Entry {
            entry_type: EntryType::Folder,
            name,
            parent: None,
            size,
            mtime,
            idx: std::sync::atomic::AtomicU32::new(0),
        })
    }

    pub fn new(
        entry_type: EntryType,
        name: String,
        parent: &Arc<Entry>,
        size: u64,
        mtime: i64,
    ) -> Arc<Entry> {
        debug_assert_eq!(parent.entry_type, EntryType::Folder);
        Arc::new(Entry {
            entry_type,
            name,
            parent: Some(Arc::downgrade(parent)),
            size,
            mtime,
            idx: std::sync::atomic::AtomicU32::new(0),
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn parent(&self) -> Option<Arc<Entry>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn idx(&self) -> u32 {
        self.idx.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn set_idx(&self, v: u32) {
        self.idx.store(v, std::sync::atomic::Ordering::Relaxed);
    }

    /// Suffix after the last `.`, empty for no dot or for folders.
    pub fn extension(&self) -> &str {
        if self.entry_type == EntryType::Folder {
            return "";
        }
        match self.name.rfind('.') {
            Some(pos) if pos + 1 < self.name.len() => &self.name[pos + 1..],
            _ => "",
        }
    }

    /// Full path reconstructed by walking the `parent` chain. Avoided on
    /// hot comparison paths (see `cmp_path`) but needed for snapshot
    /// round-trip checks and UI-facing info.
    pub fn path(&self) -> String {
        let mut segments: Vec<String> = vec![self.name.clone()];
        let mut cur = self.parent();
        while let Some(p) = cur {
            segments.push(p.name.clone());
            cur = p.parent();
        }
        segments.reverse();
        segments.join(std::path::MAIN_SEPARATOR_STR)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}
impl Eq for Entry {}

/// Case-insensitive compare, tiebroken case-sensitive (spec §4.1).
pub fn cmp_name(a: &Entry, b: &Entry) -> Ordering {
    let la = a.name.to_lowercase();
    let lb = b.name.to_lowercase();
    la.cmp(&lb).then_with(|| a.name.cmp(&b.name))
}

/// Compares full reconstructed paths without allocating when a shared
/// parent makes it unnecessary.
pub fn cmp_path(a: &Entry, b: &Entry) -> Ordering {
    if let (Some(pa), Some(pb)) = (a.parent(), b.parent()) {
        if Arc::ptr_eq(&pa, &pb) {
            return cmp_name(a, b);
        }
    }
    a.path().cmp(&b.path())
}

pub fn cmp_size(a: &Entry, b: &Entry) -> Ordering {
    a.size.cmp(&b.size)
}

pub fn cmp_mtime(a: &Entry, b: &Entry) -> Ordering {
    a.mtime.cmp(&b.mtime)
}

pub fn cmp_extension(a: &Entry, b: &Entry) -> Ordering {
    a.extension().cmp(b.extension())
}

/// Stable identity tiebreak used when primary and secondary keys tie.
/// Entries are never deduplicated by value, only by this identity order,
/// so two distinct entries with identical name/size/mtime still sort
/// deterministically.
pub fn cmp_identity(a: &Entry, b: &Entry) -> Ordering {
    (a as *const Entry as usize).cmp(&(b as *const Entry as usize))
}

pub fn cmp_by_key(key: SortKey, a: &Entry, b: &Entry) -> Ordering {
    match key {
        SortKey::Name => cmp_name(a, b),
        SortKey::Path => cmp_path(a, b),
        SortKey::Size => cmp_size(a, b),
        SortKey::ModificationTime => cmp_mtime(a, b),
        SortKey::Extension => cmp_extension(a, b),
        SortKey::None => Ordering::Equal,
    }
}

/// Full (primary, secondary, identity) comparator used by containers.
pub fn cmp_full(primary: SortKey, secondary: SortKey, a: &Entry, b: &Entry) -> Ordering {
    cmp_by_key(primary, a, b)
        .then_with(|| cmp_by_key(secondary, a, b))
        .then_with(|| cmp_identity(a, b))
}
