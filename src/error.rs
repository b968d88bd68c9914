use thiserror::Error;

/// Failures of the usage index core.
///
/// A build outcome is handed to every caller waiting on it, so the error is
/// `Clone` and carries rendered messages rather than source chains.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("failed to enumerate archive entries: {0}")]
    Enumerate(String),

    #[error("failed to read entry {entry}: {message}")]
    Read { entry: String, message: String },

    #[error("shard {worker} failed to ingest {entry}: {message}")]
    Ingest {
        worker: usize,
        entry: String,
        message: String,
    },

    #[error("shard {worker} failed: {message}")]
    Shard { worker: usize, message: String },

    #[error("worker task panicked: {0}")]
    WorkerPanicked(String),

    #[error("index build ended without an outcome")]
    BuildAborted,

    #[error("worker pool needs at least one shard")]
    EmptyPool,

    #[error("failed to spawn shard worker: {0}")]
    Spawn(String),
}

impl IndexError {
    pub(crate) fn shard(worker: usize, err: anyhow::Error) -> Self {
        IndexError::Shard {
            worker,
            message: format!("{err:#}"),
        }
    }
}

impl From<tokio::task::JoinError> for IndexError {
    fn from(err: tokio::task::JoinError) -> Self {
        IndexError::WorkerPanicked(err.to_string())
    }
}
