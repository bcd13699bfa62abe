use std::path::PathBuf;

use crate::channel::{ChannelBackend, DEFAULT_CAPACITY};
use crate::processor::DEFAULT_WINDOW_BYTES;
use crate::record::Extraction;

/// Upper bound for the default worker count.
const MAX_DEFAULT_WORKERS: usize = 8;

/// Settings for one aggregation run.
#[derive(Debug, Clone)]
pub struct AggregateConfig {
    /// Number of workers, and therefore chunks.
    pub workers: usize,

    /// Rule used to isolate the path of each record.
    pub extraction: Extraction,

    /// Transport for worker results.
    pub channel: ChannelBackend,

    /// Largest encoded aggregate a worker may hand back, in bytes.
    pub channel_capacity: u64,

    /// Read buffer size per worker, in bytes.
    pub window_bytes: usize,

    /// Parent directory for temp-file channels. `None` uses the system default.
    pub temp_dir: Option<PathBuf>,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            extraction: Extraction::default(),
            channel: ChannelBackend::default(),
            channel_capacity: DEFAULT_CAPACITY,
            window_bytes: DEFAULT_WINDOW_BYTES,
            temp_dir: None,
        }
    }
}

impl AggregateConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_channel(mut self, channel: ChannelBackend) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_extraction(mut self, extraction: Extraction) -> Self {
        self.extraction = extraction;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: u64) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

pub fn default_workers() -> usize {
    std::cmp::min(num_cpus::get(), MAX_DEFAULT_WORKERS).max(1)
}
