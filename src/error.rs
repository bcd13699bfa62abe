use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures moving a worker's aggregate to the coordinator.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("payload of {size} bytes exceeds channel capacity of {capacity} bytes")]
    PayloadTooLarge { size: u64, capacity: u64 },

    #[error("failed to encode payload: {0}")]
    Encode(String),

    #[error("corrupt payload: {0}")]
    Corrupt(String),

    #[error("channel already carries a result")]
    AlreadySent,

    #[error("channel holds no result")]
    Empty,
}

/// Failures inside a single worker. Always fatal for the run.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to read chunk {start}..{end}: {source}")]
    Read {
        start: u64,
        end: u64,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// Run-level failures surfaced by the coordinator.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("cannot plan chunks for {path:?}: {reason}")]
    Planning { path: PathBuf, reason: String },

    #[error("failed to start worker pool: {0}")]
    Spawn(String),

    #[error("worker {index} failed: {source}")]
    Worker {
        index: usize,
        #[source]
        source: WorkerError,
    },

    #[error("failed to write output {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AggregateError {
    pub(crate) fn planning(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        AggregateError::Planning {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Index of the worker responsible for the failure, if any.
    pub fn worker_index(&self) -> Option<usize> {
        match self {
            AggregateError::Worker { index, .. } => Some(*index),
            _ => None,
        }
    }
}
