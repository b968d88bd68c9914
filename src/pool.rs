use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::shard::{ClassFileShard, IndexShard};

const FALLBACK_PARALLELISM: usize = 4;

/// Host parallelism, or 4 when the host does not report it.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(FALLBACK_PARALLELISM)
}

/// The set of shards one loaded archive is indexed into.
pub struct WorkerPool {
    shards: Vec<Arc<dyn IndexShard>>,
}

impl WorkerPool {
    pub fn new(shards: Vec<Arc<dyn IndexShard>>) -> Result<Self, IndexError> {
        if shards.is_empty() {
            return Err(IndexError::EmptyPool);
        }
        Ok(Self { shards })
    }

    pub fn from_factory(
        workers: usize,
        mut factory: impl FnMut(usize) -> Arc<dyn IndexShard>,
    ) -> Result<Self, IndexError> {
        Self::new((0..workers).map(&mut factory).collect())
    }

    /// Spawns one [`ClassFileShard`] thread per configured worker.
    pub fn spawn(config: &IndexConfig) -> Result<Self, IndexError> {
        let workers = config.workers.max(1);
        let mut shards: Vec<Arc<dyn IndexShard>> = Vec::with_capacity(workers);
        for id in 0..workers {
            let shard = ClassFileShard::spawn(id, config.namespaces.clone())
                .map_err(|err| IndexError::Spawn(err.to_string()))?;
            shards.push(Arc::new(shard));
        }
        tracing::info!(workers, "created usage index worker pool");
        Self::new(shards)
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn shards(&self) -> &[Arc<dyn IndexShard>] {
        &self.shards
    }

    /// Clears every shard concurrently.
    pub async fn clear(&self) -> Result<(), IndexError> {
        let mut pending = JoinSet::new();
        for (worker, shard) in self.shards.iter().enumerate() {
            let shard = Arc::clone(shard);
            pending.spawn(async move {
                shard
                    .clear()
                    .await
                    .map_err(|err| IndexError::shard(worker, err))
            });
        }
        while let Some(joined) = pending.join_next().await {
            joined??;
        }
        Ok(())
    }

    /// Record count of each shard, in worker order.
    pub async fn usage_sizes(&self) -> Result<Vec<usize>, IndexError> {
        let mut sizes = Vec::with_capacity(self.shards.len());
        for (worker, shard) in self.shards.iter().enumerate() {
            sizes.push(
                shard
                    .usage_size()
                    .await
                    .map_err(|err| IndexError::shard(worker, err))?,
            );
        }
        Ok(sizes)
    }

    pub async fn shutdown(&self) {
        for shard in &self.shards {
            shard.shutdown().await;
        }
    }
}
