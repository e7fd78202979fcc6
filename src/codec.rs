//! Binary snapshot codec (spec §4.6).
//!
//! Layout, little-endian throughout:
//!
//! ```text
//! header:
//!   magic            [u8; 4]   "FSDB"
//!   major_ver        u8
//!   minor_ver        u8
//!   flags            u64       IndexFlags bits
//!   num_folders      u32
//!   num_files        u32
//!   folder_block_size u64      backfilled after the folder block is written
//!   file_block_size  u64      backfilled after the file block is written
//!   num_indexes      u32       reserved, currently always 0
//!   num_excludes     u32       reserved, currently always 0
//! folder block (num_folders records, in Name-sorted order):
//!   db_index         u16       owning per-root index id
//!   name             delta-encoded (see below)
//!   size             u64       present iff flags & SIZE
//!   mtime            i64       present iff flags & MODIFICATION_TIME
//!   parent_idx       u32       Name-sorted position of the parent folder;
//!                              equals this record's own position for a root
//! file block (num_files records, in Name-sorted order):
//!   name             delta-encoded
//!   size             u64       present iff flags & SIZE
//!   mtime            i64       present iff flags & MODIFICATION_TIME
//!   parent_idx       u32       Name-sorted position of the owning folder
//! sorted-arrays block:
//!   num_sorted_arrays u32
//!   for each: sort_id u32, folder_perm [u32; num_folders], file_perm [u32; num_files]
//! ```
//!
//! `parent_idx`/`folder_perm`/`file_perm` all reference the *Name-sorted*
//! position of an entry (`Entry::idx`), refreshed immediately before a save
//! and not meaningful otherwise. `sort_id` is the position of the key in
//! [`FAST_SORT_KEYS`] minus one (`Name` = 0 is implicit and never appears in
//! this block).
//!
//! Names are delta-encoded against the previous name *within the same
//! block*, operating on raw bytes rather than `&str` so a multi-byte UTF-8
//! character straddling the shared/distinct boundary never causes a
//! char-boundary panic. Each name is capped at 255 bytes — long enough for
//! `NAME_MAX` on every filesystem this engine targets — and encoding a
//! longer one is a hard `FsearchError::Encode`, not a silent truncation.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fs2::FileExt;

use crate::container::EntriesContainer;
use crate::entry::{Entry, EntryType, SortKey};
use crate::error::{FsearchError, Result};
use crate::include::Include;
use crate::index::{IndexFlags, IndexState, PerRootIndex};
use crate::store::IndexStore;

const MAGIC: &[u8; 4] = b"FSDB";
const MAJOR_VERSION: u8 = 1;
const MINOR_VERSION: u8 = 1;
const MAX_NAME_LEN: usize = 255;
const SNAPSHOT_FILE_NAME: &str = "fsearch.db";
const SNAPSHOT_TMP_NAME: &str = "fsearch.db.tmp";

const NON_NAME_KEYS: [SortKey; 4] = [
    SortKey::Path,
    SortKey::Size,
    SortKey::ModificationTime,
    SortKey::Extension,
];

fn sort_id(key: SortKey) -> Option<u32> {
    match key {
        SortKey::Path => Some(1),
        SortKey::Size => Some(2),
        SortKey::ModificationTime => Some(3),
        SortKey::Extension => Some(4),
        SortKey::Name | SortKey::None => None,
    }
}

fn sort_key_from_id(id: u32) -> Option<SortKey> {
    match id {
        1 => Some(SortKey::Path),
        2 => Some(SortKey::Size),
        3 => Some(SortKey::ModificationTime),
        4 => Some(SortKey::Extension),
        _ => None,
    }
}

/// Writes `store`'s current state to `<dir>/fsearch.db`, via a sibling
/// `.tmp` file and an atomic rename (spec §4.6 "save protocol"). Held under
/// an exclusive advisory lock (`fs2`) for the duration; on any failure the
/// `.tmp` file is removed and the prior snapshot, if any, is left untouched.
pub fn save(store: &IndexStore, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let tmp_path = dir.join(SNAPSHOT_TMP_NAME);
    let final_path = dir.join(SNAPSHOT_FILE_NAME);

    match save_to(store, &tmp_path) {
        Ok(()) => {
            let _ = std::fs::remove_file(&final_path);
            std::fs::rename(&tmp_path, &final_path)?;
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn save_to(store: &IndexStore, tmp_path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(tmp_path)?;
    file.lock_exclusive()?;
    let result = write_body(store, &file);
    let _ = file.unlock();
    result
}

fn write_body(store: &IndexStore, file: &File) -> Result<()> {
    let folder_name_container = store
        .get_folders(SortKey::Name)
        .ok_or_else(|| FsearchError::Encode("store has no Name folder container".into()))?;
    let file_name_container = store
        .get_files(SortKey::Name)
        .ok_or_else(|| FsearchError::Encode("store has no Name file container".into()))?;
    let folders = folder_name_container.joined();
    let files = file_name_container.joined();

    // Snapshot `idx` is a scratch slot; refresh it to this entry's position
    // in the Name-sorted container immediately before writing anything that
    // references it (spec §3).
    for (i, e) in folders.iter().enumerate() {
        e.set_idx(i as u32);
    }
    for (i, e) in files.iter().enumerate() {
        e.set_idx(i as u32);
    }

    let mut owner: HashMap<usize, u32> = HashMap::new();
    for idx in store.indices() {
        let id = idx.get_id();
        owner.insert(Arc::as_ptr(idx.root()) as usize, id);
        for f in idx.get_folders() {
            owner.insert(Arc::as_ptr(&f) as usize, id);
        }
    }

    let flags = store.flags();
    let mut w = file;

    w.write_all(MAGIC)?;
    w.write_u8(MAJOR_VERSION)?;
    w.write_u8(MINOR_VERSION)?;
    w.write_u64::<LittleEndian>(flags.bits())?;
    w.write_u32::<LittleEndian>(folders.len() as u32)?;
    w.write_u32::<LittleEndian>(files.len() as u32)?;
    let folder_size_offset = w.stream_position()?;
    w.write_u64::<LittleEndian>(0)?;
    let file_size_offset = w.stream_position()?;
    w.write_u64::<LittleEndian>(0)?;
    w.write_u32::<LittleEndian>(0)?; // num_indexes, reserved
    w.write_u32::<LittleEndian>(0)?; // num_excludes, reserved

    let folder_block_start = w.stream_position()?;
    let mut prev_name: Vec<u8> = Vec::new();
    for e in &folders {
        let db_index = owner.get(&(Arc::as_ptr(e) as usize)).copied().unwrap_or(0);
        let db_index: u16 = db_index
            .try_into()
            .map_err(|_| FsearchError::Encode(format!("db index {db_index} exceeds u16 range")))?;
        w.write_u16::<LittleEndian>(db_index)?;
        write_delta_name(&mut w, &mut prev_name, e.name.as_bytes())?;
        if flags.contains(IndexFlags::SIZE) {
            w.write_u64::<LittleEndian>(e.size)?;
        }
        if flags.contains(IndexFlags::MODIFICATION_TIME) {
            w.write_i64::<LittleEndian>(e.mtime)?;
        }
        let parent_idx = if e.is_root() {
            e.idx()
        } else {
            e.parent()
                .expect("non-root folder always has a parent")
                .idx()
        };
        w.write_u32::<LittleEndian>(parent_idx)?;
    }
    let folder_block_size = w.stream_position()? - folder_block_start;

    let file_block_start = w.stream_position()?;
    prev_name.clear();
    for e in &files {
        write_delta_name(&mut w, &mut prev_name, e.name.as_bytes())?;
        if flags.contains(IndexFlags::SIZE) {
            w.write_u64::<LittleEndian>(e.size)?;
        }
        if flags.contains(IndexFlags::MODIFICATION_TIME) {
            w.write_i64::<LittleEndian>(e.mtime)?;
        }
        let parent_idx = e.parent().expect("a file always has a parent").idx();
        w.write_u32::<LittleEndian>(parent_idx)?;
    }
    let file_block_size = w.stream_position()? - file_block_start;

    let mut arrays: Vec<(SortKey, Arc<EntriesContainer>, Arc<EntriesContainer>)> = Vec::new();
    for key in NON_NAME_KEYS {
        if let (Some(fc), Some(filec)) = (store.get_folders(key), store.get_files(key)) {
            arrays.push((key, fc, filec));
        }
    }
    w.write_u32::<LittleEndian>(arrays.len() as u32)?;
    for (key, fc, filec) in &arrays {
        w.write_u32::<LittleEndian>(sort_id(*key).expect("non-Name key always has a sort id"))?;
        for e in fc.joined().iter() {
            w.write_u32::<LittleEndian>(e.idx())?;
        }
        for e in filec.joined().iter() {
            w.write_u32::<LittleEndian>(e.idx())?;
        }
    }

    w.seek(SeekFrom::Start(folder_size_offset))?;
    w.write_u64::<LittleEndian>(folder_block_size)?;
    w.seek(SeekFrom::Start(file_size_offset))?;
    w.write_u64::<LittleEndian>(file_block_size)?;
    w.flush()?;
    Ok(())
}

/// Common-prefix length against `prev` (capped at 255) followed by the
/// distinct suffix. `prev` is updated to `name` afterward.
fn write_delta_name<W: Write>(w: &mut W, prev: &mut Vec<u8>, name: &[u8]) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(FsearchError::Encode(format!(
            "name {:?} is {} bytes, exceeds the {MAX_NAME_LEN}-byte snapshot limit",
            String::from_utf8_lossy(name),
            name.len()
        )));
    }
    let common = prev
        .iter()
        .zip(name.iter())
        .take_while(|(a, b)| a == b)
        .count()
        .min(MAX_NAME_LEN);
    let suffix = &name[common..];
    w.write_u8(common as u8)?;
    w.write_u8(suffix.len() as u8)?;
    w.write_all(suffix)?;
    prev.clear();
    prev.extend_from_slice(name);
    Ok(())
}

fn read_delta_name<R: Read>(r: &mut R, prev: &mut Vec<u8>) -> Result<Vec<u8>> {
    let common = r.read_u8()? as usize;
    let suffix_len = r.read_u8()? as usize;
    if common > prev.len() {
        return Err(FsearchError::Decode(
            "delta-encoded name's common prefix is longer than the previous name".into(),
        ));
    }
    let mut suffix = vec![0u8; suffix_len];
    r.read_exact(&mut suffix)?;
    let mut name = Vec::with_capacity(common + suffix_len);
    name.extend_from_slice(&prev[..common]);
    name.extend_from_slice(&suffix);
    *prev = name.clone();
    Ok(name)
}

/// Everything a snapshot load reconstructs, ready to hand to
/// [`IndexStore::restore`].
pub struct LoadedSnapshot {
    pub flags: IndexFlags,
    pub indices: Vec<Arc<PerRootIndex>>,
    pub folder_containers: HashMap<SortKey, Arc<EntriesContainer>>,
    pub file_containers: HashMap<SortKey, Arc<EntriesContainer>>,
}

/// Reads `<dir>/fsearch.db`, validating the header and every forward
/// reference before any state is handed back — a short read or an invalid
/// id aborts with no partially-applied state (spec §4.6 "load protocol").
pub fn load(dir: &Path) -> Result<LoadedSnapshot> {
    let path = dir.join(SNAPSHOT_FILE_NAME);
    let file = OpenOptions::new().read(true).open(path)?;
    file.lock_exclusive()?;
    let result = read_body(&file);
    let _ = file.unlock();
    result
}

struct RawFolder {
    db_index: u32,
    name: Vec<u8>,
    size: u64,
    mtime: i64,
    parent_idx: u32,
}

struct RawFile {
    name: Vec<u8>,
    size: u64,
    mtime: i64,
    parent_idx: u32,
}

fn read_body(file: &File) -> Result<LoadedSnapshot> {
    let mut r = file;

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(FsearchError::Decode("bad magic, not a snapshot file".into()));
    }
    let major = r.read_u8()?;
    if major != MAJOR_VERSION {
        return Err(FsearchError::Decode(format!(
            "unsupported major version {major}, expected {MAJOR_VERSION}"
        )));
    }
    let minor = r.read_u8()?;
    if minor > MINOR_VERSION {
        return Err(FsearchError::Decode(format!(
            "unsupported minor version {minor}, newest known is {MINOR_VERSION}"
        )));
    }
    let flags = IndexFlags::from_bits_truncate(r.read_u64::<LittleEndian>()?);
    let num_folders = r.read_u32::<LittleEndian>()? as usize;
    let num_files = r.read_u32::<LittleEndian>()? as usize;
    let _folder_block_size = r.read_u64::<LittleEndian>()?;
    let _file_block_size = r.read_u64::<LittleEndian>()?;
    let _num_indexes = r.read_u32::<LittleEndian>()?;
    let _num_excludes = r.read_u32::<LittleEndian>()?;

    let mut raw_folders = Vec::with_capacity(num_folders);
    let mut prev = Vec::new();
    for _ in 0..num_folders {
        let db_index = r.read_u16::<LittleEndian>()? as u32;
        let name = read_delta_name(&mut r, &mut prev)?;
        let size = if flags.contains(IndexFlags::SIZE) {
            r.read_u64::<LittleEndian>()?
        } else {
            0
        };
        let mtime = if flags.contains(IndexFlags::MODIFICATION_TIME) {
            r.read_i64::<LittleEndian>()?
        } else {
            0
        };
        let parent_idx = r.read_u32::<LittleEndian>()?;
        raw_folders.push(RawFolder { db_index, name, size, mtime, parent_idx });
    }
    for (i, f) in raw_folders.iter().enumerate() {
        if f.parent_idx as usize >= raw_folders.len() {
            return Err(FsearchError::Decode(format!(
                "folder {i} parent_idx {} out of range",
                f.parent_idx
            )));
        }
    }

    let mut built: Vec<Option<Arc<Entry>>> = vec![None; raw_folders.len()];
    let mut visiting = vec![false; raw_folders.len()];
    for i in 0..raw_folders.len() {
        build_folder(i, &raw_folders, &mut built, &mut visiting)?;
    }
    let folders: Vec<Arc<Entry>> = built
        .into_iter()
        .map(|e| e.expect("every folder index was built or errored out"))
        .collect();
    for (i, e) in folders.iter().enumerate() {
        e.set_idx(i as u32);
    }

    let mut raw_files = Vec::with_capacity(num_files);
    prev.clear();
    for _ in 0..num_files {
        let name = read_delta_name(&mut r, &mut prev)?;
        let size = if flags.contains(IndexFlags::SIZE) {
            r.read_u64::<LittleEndian>()?
        } else {
            0
        };
        let mtime = if flags.contains(IndexFlags::MODIFICATION_TIME) {
            r.read_i64::<LittleEndian>()?
        } else {
            0
        };
        let parent_idx = r.read_u32::<LittleEndian>()?;
        raw_files.push(RawFile { name, size, mtime, parent_idx });
    }

    let mut files = Vec::with_capacity(raw_files.len());
    for (i, rf) in raw_files.iter().enumerate() {
        let parent = folders.get(rf.parent_idx as usize).ok_or_else(|| {
            FsearchError::Decode(format!("file {i} parent_idx {} out of range", rf.parent_idx))
        })?;
        let name = String::from_utf8(rf.name.clone())
            .map_err(|e| FsearchError::Decode(format!("file {i} name is not utf-8: {e}")))?;
        files.push(Entry::new(EntryType::File, name, parent, rf.size, rf.mtime));
    }
    for (i, e) in files.iter().enumerate() {
        e.set_idx(i as u32);
    }

    let num_sorted_arrays = r.read_u32::<LittleEndian>()?;
    let mut folder_orders: HashMap<SortKey, Vec<u32>> = HashMap::new();
    let mut file_orders: HashMap<SortKey, Vec<u32>> = HashMap::new();
    for _ in 0..num_sorted_arrays {
        let raw_id = r.read_u32::<LittleEndian>()?;
        let key = sort_key_from_id(raw_id)
            .ok_or_else(|| FsearchError::Decode(format!("unknown sort id {raw_id}")))?;
        let mut fperm = vec![0u32; folders.len()];
        for slot in fperm.iter_mut() {
            *slot = r.read_u32::<LittleEndian>()?;
        }
        let mut fileperm = vec![0u32; files.len()];
        for slot in fileperm.iter_mut() {
            *slot = r.read_u32::<LittleEndian>()?;
        }
        folder_orders.insert(key, fperm);
        file_orders.insert(key, fileperm);
    }

    // Group folders/files by owning per-root index. Files carry no
    // db_index of their own; they inherit it from whichever root they walk
    // up to.
    let mut root_db_index: HashMap<usize, u32> = HashMap::new();
    let mut buckets: HashMap<u32, (Option<Arc<Entry>>, Vec<Arc<Entry>>, Vec<Arc<Entry>>)> =
        HashMap::new();
    for (i, rf) in raw_folders.iter().enumerate() {
        let e = folders[i].clone();
        let bucket = buckets
            .entry(rf.db_index)
            .or_insert_with(|| (None, Vec::new(), Vec::new()));
        if e.is_root() {
            root_db_index.insert(Arc::as_ptr(&e) as usize, rf.db_index);
            bucket.0 = Some(e);
        } else {
            bucket.1.push(e);
        }
    }
    for file in &files {
        let mut cur = file.parent();
        let mut root_ptr = None;
        while let Some(p) = cur {
            if p.is_root() {
                root_ptr = Some(Arc::as_ptr(&p) as usize);
                break;
            }
            cur = p.parent();
        }
        if let Some(rp) = root_ptr {
            if let Some(&db_index) = root_db_index.get(&rp) {
                buckets
                    .entry(db_index)
                    .or_insert_with(|| (None, Vec::new(), Vec::new()))
                    .2
                    .push(file.clone());
            }
        }
    }

    let mut indices = Vec::new();
    for (db_index, (root_opt, folders_for_root, files_for_root)) in buckets {
        let Some(root) = root_opt else {
            // A db_index with entries but no recorded root folder is a
            // malformed snapshot; skip rather than fabricate a root.
            continue;
        };
        let include = Include {
            path: std::path::PathBuf::from(root.name.clone()),
            id: db_index,
            one_file_system: false,
            monitored: false,
            scan_after_launch: false,
        };
        indices.push(Arc::new(PerRootIndex::from_parts(
            db_index,
            include,
            flags,
            root,
            files_for_root,
            folders_for_root,
            IndexState::Ready,
        )));
    }

    let mut folder_containers = HashMap::new();
    let mut file_containers = HashMap::new();
    folder_containers.insert(
        SortKey::Name,
        Arc::new(EntriesContainer::from_presorted(
            folders.clone(),
            SortKey::Name,
            SortKey::None,
            EntryType::Folder,
        )),
    );
    file_containers.insert(
        SortKey::Name,
        Arc::new(EntriesContainer::from_presorted(
            files.clone(),
            SortKey::Name,
            SortKey::None,
            EntryType::File,
        )),
    );
    for key in NON_NAME_KEYS {
        let (Some(fperm), Some(fileperm)) = (folder_orders.get(&key), file_orders.get(&key))
        else {
            continue;
        };
        let ordered_folders = resolve_permutation(fperm, &folders)?;
        let ordered_files = resolve_permutation(fileperm, &files)?;
        folder_containers.insert(
            key,
            Arc::new(EntriesContainer::from_presorted(
                ordered_folders,
                key,
                SortKey::None,
                EntryType::Folder,
            )),
        );
        file_containers.insert(
            key,
            Arc::new(EntriesContainer::from_presorted(
                ordered_files,
                key,
                SortKey::None,
                EntryType::File,
            )),
        );
    }

    Ok(LoadedSnapshot { flags, indices, folder_containers, file_containers })
}

/// `perm[j]` is the Name-sorted `idx` of the entry at position `j` under
/// some other ordering; `name_sorted[idx]` recovers the entry itself.
fn resolve_permutation(perm: &[u32], name_sorted: &[Arc<Entry>]) -> Result<Vec<Arc<Entry>>> {
    perm.iter()
        .map(|&idx| {
            name_sorted
                .get(idx as usize)
                .cloned()
                .ok_or_else(|| FsearchError::Decode(format!("sorted-array index {idx} out of range")))
        })
        .collect()
}

fn build_folder(
    i: usize,
    raw: &[RawFolder],
    built: &mut [Option<Arc<Entry>>],
    visiting: &mut [bool],
) -> Result<Arc<Entry>> {
    if let Some(e) = &built[i] {
        return Ok(e.clone());
    }
    if visiting[i] {
        return Err(FsearchError::Decode(format!("cycle in folder parent chain at {i}")));
    }
    visiting[i] = true;
    let r = &raw[i];
    let name = String::from_utf8(r.name.clone())
        .map_err(|e| FsearchError::Decode(format!("folder {i} name is not utf-8: {e}")))?;
    let entry = if r.parent_idx as usize == i {
        Entry::new_root_with_size(name, r.size, r.mtime)
    } else {
        let parent = build_folder(r.parent_idx as usize, raw, built, visiting)?;
        Entry::new(EntryType::Folder, name, &parent, r.size, r.mtime)
    };
    visiting[i] = false;
    built[i] = Some(entry.clone());
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::events::EngineEvent;
    use crate::exclude::ExcludeManager;
    use crate::include::SimpleIncludeManager;
    use crate::scanner::Scanner;
    use std::sync::mpsc;

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

    struct FixedScanner {
        files: Vec<(String, u64, i64)>,
        folders: Vec<String>,
    }
    impl Scanner for FixedScanner {
        fn scan(
            &self,
            root: &Arc<Entry>,
            _exclude: &dyn ExcludeManager,
            _flags: IndexFlags,
            _cancel: &CancelToken,
        ) -> (Vec<Arc<Entry>>, Vec<Arc<Entry>>) {
            let folders: Vec<Arc<Entry>> = self
                .folders
                .iter()
                .map(|n| Entry::new(EntryType::Folder, n.clone(), root, 0, 0))
                .collect();
            let files: Vec<Arc<Entry>> = self
                .files
                .iter()
                .map(|(n, size, mtime)| Entry::new(EntryType::File, n.clone(), root, *size, *mtime))
                .collect();
            (files, folders)
        }
    }

    fn event_sink() -> Arc<dyn crate::events::EventSink> {
        let (tx, _rx) = mpsc::channel::<EngineEvent>();
        Arc::new(crate::events::ChannelEventSink(tx))
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = FixedScanner {
            files: vec![
                ("b.txt".into(), 20, 100),
                ("a.txt".into(), 10, 200),
                ("c.txt".into(), 30, 50),
            ],
            folders: vec!["sub".into()],
        };
        let include_mgr = Box::new(SimpleIncludeManager::new(vec![Include {
            path: dir.path().join("root"),
            id: 1,
            one_file_system: false,
            monitored: false,
            scan_after_launch: false,
        }]));
        let store = IndexStore::with_scanner(
            include_mgr,
            Box::new(NoopExclude),
            IndexFlags::SIZE | IndexFlags::MODIFICATION_TIME,
            event_sink(),
            Box::new(scanner),
        );
        store.start(&CancelToken::new()).unwrap();

        save(&store, dir.path()).unwrap();

        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded.flags, IndexFlags::SIZE | IndexFlags::MODIFICATION_TIME);
        let names: Vec<String> = loaded
            .folder_containers
            .get(&SortKey::Name)
            .unwrap()
            .joined()
            .iter()
            .map(|e| e.name.clone())
            .collect();
        assert!(names.contains(&"sub".to_string()));

        let file_names: Vec<String> = loaded
            .file_containers
            .get(&SortKey::Name)
            .unwrap()
            .joined()
            .iter()
            .map(|e| e.name.clone())
            .collect();
        assert_eq!(file_names, ["a.txt", "b.txt", "c.txt"]);

        let size_order: Vec<u64> = loaded
            .file_containers
            .get(&SortKey::Size)
            .unwrap()
            .joined()
            .iter()
            .map(|e| e.size)
            .collect();
        assert_eq!(size_order, [10, 20, 30]);
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SNAPSHOT_FILE_NAME), b"nope").unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, FsearchError::Decode(_)));
    }

    #[test]
    fn delta_name_round_trip() {
        let mut buf = Vec::new();
        let mut prev = Vec::new();
        write_delta_name(&mut buf, &mut prev, b"alphabet").unwrap();
        write_delta_name(&mut buf, &mut prev, b"alphabetical").unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let mut prev = Vec::new();
        let n1 = read_delta_name(&mut cursor, &mut prev).unwrap();
        let n2 = read_delta_name(&mut cursor, &mut prev).unwrap();
        assert_eq!(n1, b"alphabet");
        assert_eq!(n2, b"alphabetical");
    }
}
