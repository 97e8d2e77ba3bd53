//! Local multi-shard execution on a rayon thread pool.

use crate::document::Shard;
use crate::error::SiftError;
use rayon::prelude::*;
use tracing::info;

/// Runs one task per shard, `workers` at a time.
///
/// Tasks are fully independent; results come back in shard order.
#[derive(Debug, Clone, Copy)]
pub struct LocalExecutor {
    shard_count: usize,
    workers: usize,
}

impl LocalExecutor {
    /// Executor for `shard_count` shards using every available core.
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        Self {
            shard_count: shard_count.max(1),
            workers: 0,
        }
    }

    /// Limit concurrency to `workers` threads (0 means rayon's default).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Number of shards this executor runs.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// Run `task` once per shard and collect the results.
    ///
    /// The first error aborts collection and is returned.
    pub fn run<T, E, F>(&self, task: F) -> Result<Vec<T>, E>
    where
        T: Send,
        E: From<SiftError> + Send,
        F: Fn(Shard) -> Result<T, E> + Send + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| SiftError::Pipeline(format!("failed to build thread pool: {e}")))?;

        info!(
            shards = self.shard_count,
            workers = pool.current_num_threads(),
            "Launching local executor"
        );

        pool.install(|| {
            Shard::all(self.shard_count)
                .collect::<Vec<_>>()
                .into_par_iter()
                .map(&task)
                .collect()
        })
    }
}
