//! Process-wide parallelism degree for index construction.
//!
//! The build service optionally pins the number of threads used by the
//! library's internal parallel loops. The setting is deliberately global
//! and mutable: it mirrors the thread-count knob of the underlying
//! construction machinery, which is not scoped per call. Concurrent builds
//! racing to set different thread counts therefore observe last-writer-wins
//! semantics; callers that care should serialize their builds.

use std::sync::Arc;

use parking_lot::RwLock;
use rayon::ThreadPool;

use crate::error::{FalcataError, Result};

static BUILD_POOL: RwLock<Option<(usize, Arc<ThreadPool>)>> = RwLock::new(None);

/// Set the process-wide build parallelism degree.
///
/// A value of 0 resets to the default (the global rayon pool, sized to the
/// number of logical CPUs). Last writer wins across threads.
pub fn set_build_threads(threads: usize) -> Result<()> {
    let mut slot = BUILD_POOL.write();

    if threads == 0 {
        *slot = None;
        return Ok(());
    }

    if slot.as_ref().map(|(current, _)| *current) == Some(threads) {
        return Ok(());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| FalcataError::other(format!("failed to create build thread pool: {e}")))?;
    *slot = Some((threads, Arc::new(pool)));
    Ok(())
}

/// The currently configured parallelism degree.
pub fn build_threads() -> usize {
    BUILD_POOL
        .read()
        .as_ref()
        .map(|(threads, _)| *threads)
        .unwrap_or_else(num_cpus::get)
}

/// Run a closure inside the configured build pool, or inline on the global
/// rayon pool when no explicit degree is set.
pub fn install<F, R>(work: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    let pool = BUILD_POOL.read().as_ref().map(|(_, pool)| pool.clone());
    match pool {
        Some(pool) => pool.install(work),
        None => work(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rayon::prelude::*;

    #[test]
    fn test_set_and_reset_build_threads() {
        set_build_threads(2).unwrap();
        assert_eq!(build_threads(), 2);

        let sum: i64 = install(|| (0..100i64).into_par_iter().sum());
        assert_eq!(sum, 4950);

        set_build_threads(0).unwrap();
        assert!(build_threads() >= 1);
    }
}
