use std::path::PathBuf;
use std::sync::mpsc::Sender;

/// A single filesystem change as seen by a [`Monitor`] (spec §6: "emits
/// create/delete/rename/attribute events per per-root index"). Kept
/// deliberately coarse — resolving a raw event into the richer
/// `IndexEventKind` taxonomy (created/deleted/renamed/moved/changed) is the
/// per-root index's job, since only it knows which of its entries a path
/// maps to.
#[derive(Debug, Clone)]
pub enum RawFsEvent {
    Created(PathBuf),
    Removed(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
    AttributeChanged(PathBuf),
    /// The monitor lost track of a subtree and a full re-scan of `path` is
    /// required to recover (mirrors this repo's original
    /// `MustScanSubDirs`).
    RescanRequired(PathBuf),
}

/// External collaborator (spec §6). Implementors watch `root` and send
/// [`RawFsEvent`]s until dropped or `stop` is called.
pub trait Monitor: Send {
    fn watch(&mut self, root: &std::path::Path, tx: Sender<RawFsEvent>) -> std::io::Result<()>;
    fn stop(&mut self);
}

/// Default cross-platform monitor built on `notify`, in the same debounced-
/// channel style as this repo's original FSEvents watcher (a dedicated
/// thread owning the platform watcher, forwarding normalized events over an
/// mpsc channel).
pub struct NotifyMonitor {
    watcher: Option<notify::RecommendedWatcher>,
}

impl Default for NotifyMonitor {
    fn default() -> Self {
        NotifyMonitor { watcher: None }
    }
}

impl Monitor for NotifyMonitor {
    fn watch(&mut self, root: &std::path::Path, tx: Sender<RawFsEvent>) -> std::io::Result<()> {
        use notify::{EventKind, RecursiveMode, Watcher};

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else { return };
            let raw = match event.kind {
                EventKind::Create(_) => event.paths.first().cloned().map(RawFsEvent::Created),
                EventKind::Remove(_) => event.paths.first().cloned().map(RawFsEvent::Removed),
                EventKind::Modify(notify::event::ModifyKind::Name(_)) => {
                    if event.paths.len() >= 2 {
                        Some(RawFsEvent::Renamed {
                            from: event.paths[0].clone(),
                            to: event.paths[1].clone(),
                        })
                    } else {
                        event.paths.first().cloned().map(RawFsEvent::AttributeChanged)
                    }
                }
                EventKind::Modify(_) => {
                    event.paths.first().cloned().map(RawFsEvent::AttributeChanged)
                }
                _ => None,
            };
            if let Some(raw) = raw {
                let _ = tx.send(raw);
            }
        })
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        self.watcher = Some(watcher);
        Ok(())
    }

    fn stop(&mut self) {
        self.watcher = None;
    }
}
