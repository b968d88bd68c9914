//! One usage index per loaded archive.
//!
//! [`UsageIndex`] bundles the pool, progress channel, builder and router that
//! belong to a single archive. [`SessionSlot`] holds the current one and
//! disposes of it when a different archive is loaded.

use std::sync::{Arc, Mutex, PoisonError};

use crate::archive::ArchiveSource;
use crate::builder::{BuildReport, BuildStatus, IndexBuilder};
use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::pool::WorkerPool;
use crate::progress::{ProgressChannel, ProgressReceiver};
use crate::router::QueryRouter;
use crate::usage::{UsageKey, UsageString};

pub struct UsageIndex {
    archive: Arc<dyn ArchiveSource>,
    builder: IndexBuilder,
    router: QueryRouter,
}

impl UsageIndex {
    pub fn new(archive: Arc<dyn ArchiveSource>, pool: WorkerPool) -> Self {
        let builder = IndexBuilder::new(
            Arc::clone(&archive),
            Arc::new(pool),
            ProgressChannel::new(),
        );
        let router = QueryRouter::new(builder.clone());
        Self {
            archive,
            builder,
            router,
        }
    }

    /// Starts a fresh pool of class-file shards for `archive`.
    pub fn open(archive: Arc<dyn ArchiveSource>, config: &IndexConfig) -> Result<Self, IndexError> {
        Ok(Self::new(archive, WorkerPool::spawn(config)?))
    }

    pub async fn build(&self) -> Result<BuildReport, IndexError> {
        self.builder.build().await
    }

    pub async fn get_usage(&self, key: &UsageKey) -> Result<Vec<UsageString>, IndexError> {
        self.router.get_usage(key).await
    }

    pub fn progress(&self) -> ProgressReceiver {
        self.builder.progress().subscribe()
    }

    pub fn status(&self) -> BuildStatus {
        self.builder.status()
    }

    pub fn archive(&self) -> &Arc<dyn ArchiveSource> {
        &self.archive
    }

    pub async fn shutdown(&self) {
        self.builder.pool().shutdown().await;
    }
}

type PoolFactory = dyn Fn() -> Result<WorkerPool, IndexError> + Send + Sync;

/// Holds the index of the archive currently loaded.
pub struct SessionSlot {
    current: Mutex<Option<Arc<UsageIndex>>>,
    pools: Box<PoolFactory>,
}

impl SessionSlot {
    pub fn new(config: IndexConfig) -> Self {
        Self::with_pools(move || WorkerPool::spawn(&config))
    }

    pub fn with_pools(
        pools: impl Fn() -> Result<WorkerPool, IndexError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            current: Mutex::new(None),
            pools: Box::new(pools),
        }
    }

    /// Returns the index for `archive`, replacing the current one unless it
    /// was opened for this same archive instance.
    pub async fn load(&self, archive: Arc<dyn ArchiveSource>) -> Result<Arc<UsageIndex>, IndexError> {
        let (session, superseded) = {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(session) = current.as_ref()
                && std::ptr::addr_eq(Arc::as_ptr(session.archive()), Arc::as_ptr(&archive))
            {
                return Ok(Arc::clone(session));
            }
            let session = Arc::new(UsageIndex::new(archive, (self.pools)()?));
            (Arc::clone(&session), current.replace(session))
        };

        if let Some(old) = superseded {
            tracing::info!("archive replaced, shutting down previous usage index");
            old.shutdown().await;
        }
        Ok(session)
    }

    pub fn current(&self) -> Option<Arc<UsageIndex>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
