use std::path::{Path, PathBuf};

/// One configured root (spec §6). `id` matches the per-root index built
/// from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub path: PathBuf,
    pub id: u32,
    pub one_file_system: bool,
    pub monitored: bool,
    pub scan_after_launch: bool,
}

impl Include {
    pub fn get_path(&self) -> &Path {
        &self.path
    }
    pub fn get_id(&self) -> u32 {
        self.id
    }
    pub fn get_one_file_system(&self) -> bool {
        self.one_file_system
    }
    pub fn get_monitored(&self) -> bool {
        self.monitored
    }
    pub fn get_scan_after_launch(&self) -> bool {
        self.scan_after_launch
    }
}

/// External collaborator (spec §6). The engine only needs to enumerate the
/// configured roots and tell whether two configurations are equal, to
/// implement the `Scan`/`Rescan` config-equality no-op (spec §4.5, §8).
pub trait IncludeManager: Send + Sync {
    fn get_includes(&self) -> Vec<Include>;
    fn equal(&self, other: &dyn IncludeManager) -> bool;
    fn copy(&self) -> Box<dyn IncludeManager>;
}

/// Default in-memory `IncludeManager`, sufficient for embedders that don't
/// need a config file format of their own.
#[derive(Debug, Clone, Default)]
pub struct SimpleIncludeManager {
    includes: Vec<Include>,
}

impl SimpleIncludeManager {
    pub fn new(includes: Vec<Include>) -> Self {
        Self { includes }
    }
}

impl IncludeManager for SimpleIncludeManager {
    fn get_includes(&self) -> Vec<Include> {
        self.includes.clone()
    }

    fn equal(&self, other: &dyn IncludeManager) -> bool {
        let mut a = self.includes.clone();
        let mut b = other.get_includes();
        a.sort_by_key(|i| i.id);
        b.sort_by_key(|i| i.id);
        a == b
    }

    fn copy(&self) -> Box<dyn IncludeManager> {
        Box::new(self.clone())
    }
}
