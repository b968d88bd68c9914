use std::sync::Arc;
use tokio::task::JoinSet;

use crate::builder::IndexBuilder;
use crate::error::IndexError;
use crate::pool::WorkerPool;
use crate::usage::{UsageKey, UsageString};

/// Answers usage lookups against a built index.
#[derive(Clone)]
pub struct QueryRouter {
    builder: IndexBuilder,
    pool: Arc<WorkerPool>,
}

impl QueryRouter {
    pub fn new(builder: IndexBuilder) -> Self {
        let pool = Arc::clone(builder.pool());
        Self { builder, pool }
    }

    /// Waits for the build (starting it if needed), then asks every shard.
    ///
    /// Results are concatenated in the order shards answer.
    pub async fn get_usage(&self, key: &UsageKey) -> Result<Vec<UsageString>, IndexError> {
        self.builder.build().await?;

        let mut pending = JoinSet::new();
        for (worker, shard) in self.pool.shards().iter().enumerate() {
            let shard = Arc::clone(shard);
            let key = key.clone();
            pending.spawn(async move {
                shard
                    .get_usage(&key)
                    .await
                    .map_err(|err| IndexError::shard(worker, err))
            });
        }

        let mut usages = Vec::new();
        while let Some(joined) = pending.join_next().await {
            usages.extend(joined??);
        }
        tracing::debug!(
            key = %key,
            shards = self.pool.len(),
            results = usages.len(),
            "usage query answered"
        );
        Ok(usages)
    }
}
