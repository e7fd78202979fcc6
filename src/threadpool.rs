use std::sync::Arc;

use rayon::prelude::*;

use crate::entry::Entry;
use crate::query::Query;

/// Shared fixed-size thread pool used to parallelize match evaluation
/// during search and merge-sort passes during sort (spec §5). Backed by
/// `rayon`, already this repo's choice for parallel work in
/// `fd_search.rs`/`main.rs`.
pub struct ThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool {
    pub fn new(num_threads: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("fsearch-worker-{i}"))
            .build()
            .expect("failed to build thread pool");
        ThreadPool { pool }
    }

    /// Evaluates `query` over `entries` in parallel, returning the subset
    /// that matches. Order is not preserved; callers re-sort afterward.
    pub fn filter_matching(&self, entries: &[Arc<Entry>], query: &dyn Query) -> Vec<Arc<Entry>> {
        if query.matches_everything() {
            return entries.to_vec();
        }
        self.pool.install(|| {
            entries
                .par_iter()
                .filter(|e| query.matches(e))
                .cloned()
                .collect()
        })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}
