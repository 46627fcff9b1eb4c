//! Worker pool
//!
//! The driver owns one pool sized from configuration. Passes dispatch
//! independent work items through it; `process`/`map` await every item
//! before returning, which gives the between-pass happens-before
//! ordering. Work items never suspend mid-item and may not write to
//! overlapping regions of the application view.

use crate::error::DriverError;
use rayon::prelude::*;

/// Fixed-size worker pool shared by all passes of one driver run
#[derive(Debug)]
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// Pool with `threads` workers; 0 selects the number of available
    /// cores
    ///
    /// # Errors
    /// Fails when the underlying pool cannot be spawned.
    pub fn new(threads: usize) -> Result<Self, DriverError> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if threads > 0 {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| DriverError::WorkerPool(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Number of workers
    #[inline]
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run one work item per element; returns after all items finished
    pub fn process<T, F>(&self, items: &[T], work: F)
    where
        T: Sync,
        F: Fn(&T) + Send + Sync,
    {
        self.pool.install(|| items.par_iter().for_each(work));
    }

    /// Map one work item per element, preserving order
    pub fn map<T, R, F>(&self, items: &[T], work: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Send + Sync,
    {
        self.pool.install(|| items.par_iter().map(work).collect())
    }
}
