//! Concurrency helper: run per-chunk work on a bounded pool local to the job.

use anyhow::{Context, Result};
use rayon::prelude::*;

/// Workers [`map_bounded`] runs with for `items` inputs: the requested thread count, or
/// rayon's default (one per core), never more than there are items.
pub fn pool_size(threads: Option<usize>, items: usize) -> usize {
    let requested = threads.unwrap_or_else(rayon::current_num_threads).max(1);
    requested.min(items.max(1))
}

/// Apply `f` to every item with at most `threads` workers and collect the results in
/// input order. The pool is built per call so concurrent jobs never share workers.
pub fn map_bounded<T, U, F>(items: &[T], threads: Option<usize>, f: F) -> Result<Vec<U>>
where
    T: Sync,
    U: Send,
    F: Sync + Send + Fn(&T) -> Result<U>,
{
    let workers = pool_size(threads, items.len());
    if workers == 1 {
        return items.iter().map(&f).collect();
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("build worker pool")?;
    pool.install(|| items.par_iter().map(|item| f(item)).collect())
}
