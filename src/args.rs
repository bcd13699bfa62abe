use clap::Parser;
use std::path::PathBuf;

use crate::channel::{ChannelBackend, DEFAULT_CAPACITY};
use crate::config::{default_workers, AggregateConfig};
use crate::processor::DEFAULT_WINDOW_BYTES;
use crate::record::Extraction;

#[derive(Parser, Debug)]
#[command(
    name = "visitagg",
    about = "Count visits per URL path per day in an access log",
    version,
    long_about = None
)]
pub struct Args {
    /// Access log to aggregate
    pub input: PathBuf,

    /// Destination for the JSON result
    pub output: PathBuf,

    /// Number of worker threads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// How workers hand their results back
    #[arg(long, value_enum, default_value_t = ChannelBackend::Memory)]
    pub channel: ChannelBackend,

    /// Take the path as everything after a fixed-width prefix instead of parsing the URL
    #[arg(long)]
    pub prefix_width: Option<usize>,

    /// Read buffer size per worker, in bytes
    #[arg(long, default_value_t = DEFAULT_WINDOW_BYTES)]
    pub window_bytes: usize,

    /// Largest encoded result a worker may return, in bytes
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    pub channel_capacity: u64,

    /// Custom directory for temp-file channels
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn to_config(&self) -> AggregateConfig {
        AggregateConfig {
            workers: self.workers.unwrap_or_else(default_workers),
            extraction: self
                .prefix_width
                .map(Extraction::FixedOffset)
                .unwrap_or_default(),
            channel: self.channel,
            channel_capacity: self.channel_capacity,
            window_bytes: self.window_bytes,
            temp_dir: self.temp_dir.clone(),
        }
    }
}
