//! The one-time scan that fills every shard.
//!
//! [`IndexBuilder::build`] is memoized per archive: the first caller starts a
//! scan on the runtime, later callers join the same outcome, and a finished
//! build is returned as is. A failed build leaves the builder in
//! [`BuildStatus::Failed`] and the next call scans the whole archive again.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::archive::{ArchiveSource, class_entries};
use crate::error::IndexError;
use crate::pool::WorkerPool;
use crate::progress::{ProgressChannel, percent};
use crate::shard::IndexShard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    NotStarted,
    InProgress,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub worker: usize,
    pub ingested: usize,
    pub records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub attempt: u64,
    pub entries: usize,
    pub records: usize,
    pub duration_ms: u64,
    pub workers: Vec<WorkerReport>,
}

type Outcome = Option<Result<BuildReport, IndexError>>;

enum BuildState {
    NotStarted,
    InProgress(watch::Receiver<Outcome>),
    Ready(BuildReport),
    Failed(IndexError),
}

#[derive(Clone)]
pub struct IndexBuilder {
    inner: Arc<BuilderInner>,
}

struct BuilderInner {
    archive: Arc<dyn ArchiveSource>,
    pool: Arc<WorkerPool>,
    progress: ProgressChannel,
    state: Mutex<BuildState>,
    attempts: AtomicU64,
}

impl IndexBuilder {
    pub fn new(
        archive: Arc<dyn ArchiveSource>,
        pool: Arc<WorkerPool>,
        progress: ProgressChannel,
    ) -> Self {
        Self {
            inner: Arc::new(BuilderInner {
                archive,
                pool,
                progress,
                state: Mutex::new(BuildState::NotStarted),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    /// Scans the archive unless a scan is already running or has finished.
    ///
    /// Every concurrent caller observes the same outcome. The scan itself
    /// runs on its own task, so dropping the returned future does not cancel
    /// it.
    pub async fn build(&self) -> Result<BuildReport, IndexError> {
        let mut outcome = {
            let mut state = self.inner.lock_state();
            let running = match &*state {
                BuildState::Ready(report) => return Ok(report.clone()),
                // A closed sender with no outcome means the scan task died.
                BuildState::InProgress(rx) if rx.has_changed().is_ok() => Some(rx.clone()),
                _ => None,
            };
            match running {
                Some(rx) => rx,
                None => {
                    let (tx, rx) = watch::channel(None);
                    *state = BuildState::InProgress(rx.clone());
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move { inner.run(tx).await });
                    rx
                }
            }
        };

        let settled = outcome
            .wait_for(Option::is_some)
            .await
            .map_err(|_| IndexError::BuildAborted)?;
        (*settled).clone().unwrap_or(Err(IndexError::BuildAborted))
    }

    pub fn status(&self) -> BuildStatus {
        match &*self.inner.lock_state() {
            BuildState::NotStarted => BuildStatus::NotStarted,
            BuildState::InProgress(_) => BuildStatus::InProgress,
            BuildState::Ready(_) => BuildStatus::Ready,
            BuildState::Failed(_) => BuildStatus::Failed,
        }
    }

    /// Error of the most recent attempt, if it failed.
    pub fn last_error(&self) -> Option<IndexError> {
        match &*self.inner.lock_state() {
            BuildState::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Number of scans started so far.
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::Acquire)
    }

    pub fn progress(&self) -> &ProgressChannel {
        &self.inner.progress
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.inner.pool
    }
}

impl BuilderInner {
    fn lock_state(&self) -> MutexGuard<'_, BuildState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>, tx: watch::Sender<Outcome>) {
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        let result = self.scan(attempt).await;
        self.progress.finish();

        *self.lock_state() = match &result {
            Ok(report) => BuildState::Ready(report.clone()),
            Err(err) => BuildState::Failed(err.clone()),
        };
        tx.send_replace(Some(result));
    }

    async fn scan(&self, attempt: u64) -> Result<BuildReport, IndexError> {
        let started = Instant::now();
        self.progress.begin();
        self.pool.clear().await?;

        let entries = class_entries(self.archive.as_ref())
            .map_err(|err| IndexError::Enumerate(format!("{err:#}")))?;
        let total = entries.len();
        tracing::info!(
            attempt,
            entries = total,
            workers = self.pool.len(),
            "building usage index"
        );

        let queue = Arc::new(TaskQueue::new(entries));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();
        for (worker, shard) in self.pool.shards().iter().enumerate() {
            let scan = WorkerScan {
                worker,
                shard: Arc::clone(shard),
                archive: Arc::clone(&self.archive),
                queue: Arc::clone(&queue),
                completed: Arc::clone(&completed),
                progress: self.progress.clone(),
                total,
            };
            tasks.spawn(scan.run());
        }

        let mut reports = Vec::with_capacity(self.pool.len());
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(IndexError::from).and_then(|report| report) {
                Ok(report) => reports.push(report),
                Err(err) => {
                    queue.close();
                    failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = failure {
            tracing::warn!(attempt, error = %err, "usage index build failed");
            return Err(err);
        }

        reports.sort_by_key(|report| report.worker);
        let report = BuildReport {
            attempt,
            entries: total,
            records: reports.iter().map(|report| report.records).sum(),
            duration_ms: started.elapsed().as_millis() as u64,
            workers: reports,
        };
        tracing::info!(
            attempt,
            entries = report.entries,
            records = report.records,
            duration_ms = report.duration_ms,
            "usage index ready"
        );
        Ok(report)
    }
}

/// Entry names shared by all workers. Each name is handed out once.
struct TaskQueue {
    entries: Vec<String>,
    next: AtomicUsize,
    closed: AtomicBool,
}

impl TaskQueue {
    fn new(entries: Vec<String>) -> Self {
        Self {
            entries,
            next: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn pop(&self) -> Option<&str> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::AcqRel);
        self.entries.get(index).map(String::as_str)
    }

    /// Stops handing out entries; workers finish the one they hold.
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

struct WorkerScan {
    worker: usize,
    shard: Arc<dyn IndexShard>,
    archive: Arc<dyn ArchiveSource>,
    queue: Arc<TaskQueue>,
    completed: Arc<AtomicUsize>,
    progress: ProgressChannel,
    total: usize,
}

impl WorkerScan {
    async fn run(self) -> Result<WorkerReport, IndexError> {
        let mut ingested = 0;
        while let Some(entry) = self.queue.pop() {
            let bytes = self
                .archive
                .read(entry)
                .await
                .map_err(|err| IndexError::Read {
                    entry: entry.to_string(),
                    message: format!("{err:#}"),
                })?;
            self.shard
                .ingest(bytes)
                .await
                .map_err(|err| IndexError::Ingest {
                    worker: self.worker,
                    entry: entry.to_string(),
                    message: format!("{err:#}"),
                })?;
            ingested += 1;

            let done = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
            self.progress.advance(percent(done, self.total));
        }

        let records = self
            .shard
            .usage_size()
            .await
            .map_err(|err| IndexError::shard(self.worker, err))?;
        tracing::debug!(worker = self.worker, ingested, records, "worker finished");
        Ok(WorkerReport {
            worker: self.worker,
            ingested,
            records,
        })
    }
}
