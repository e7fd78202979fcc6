use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// External collaborator (spec §6): decides whether a path should be left
/// out of the index.
pub trait ExcludeManager: Send + Sync {
    fn matches(&self, path: &Path) -> bool;
    fn equal(&self, other: &dyn ExcludeManager) -> bool;
    fn copy(&self) -> Box<dyn ExcludeManager>;
    fn as_any(&self) -> &dyn std::any::Any;
}

/// `.gitignore`-aware default, grounded directly in this repo's original
/// `gitignore_filter.rs`: one `Gitignore` matcher per discovered
/// `.gitignore` beneath the configured roots, consulted in order, first
/// non-`None` verdict wins.
#[derive(Clone)]
pub struct GitignoreExcludeManager {
    roots: Vec<PathBuf>,
    matchers: Vec<Gitignore>,
}

impl GitignoreExcludeManager {
    pub fn build(roots: &[PathBuf]) -> Self {
        let mut matchers = Vec::new();
        for root in roots {
            collect_gitignores(root, 0, 6, &mut matchers);
        }
        Self {
            roots: roots.to_vec(),
            matchers,
        }
    }

    pub fn empty() -> Self {
        Self {
            roots: Vec::new(),
            matchers: Vec::new(),
        }
    }
}

fn collect_gitignores(dir: &Path, depth: usize, max_depth: usize, out: &mut Vec<Gitignore>) {
    if depth > max_depth {
        return;
    }
    let gitignore_path = dir.join(".gitignore");
    if gitignore_path.is_file() {
        let mut builder = GitignoreBuilder::new(dir);
        if builder.add(&gitignore_path).is_none() {
            if let Ok(gi) = builder.build() {
                out.push(gi);
            }
        }
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if name_str.starts_with('.') || name_str == "node_modules" {
            continue;
        }
        collect_gitignores(&path, depth + 1, max_depth, out);
    }
}

impl ExcludeManager for GitignoreExcludeManager {
    fn matches(&self, path: &Path) -> bool {
        let is_dir = path.is_dir();
        for gi in &self.matchers {
            match gi.matched(path, is_dir) {
                ignore::Match::Ignore(_) => return true,
                ignore::Match::Whitelist(_) => return false,
                ignore::Match::None => {}
            }
        }
        false
    }

    fn equal(&self, other: &dyn ExcludeManager) -> bool {
        // Two gitignore managers are equal iff built from the same root set;
        // re-walking both trees on every comparison would be wasteful and
        // the roots already fully determine the discovered matchers.
        if let Some(o) = other.as_any().downcast_ref::<GitignoreExcludeManager>() {
            self.roots == o.roots
        } else {
            false
        }
    }

    fn copy(&self) -> Box<dyn ExcludeManager> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
