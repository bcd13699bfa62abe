pub mod args;
pub mod channel;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod planner;
pub mod processor;
pub mod record;
pub mod stats;
pub mod utils;

pub use args::Args;
pub use channel::{ChannelBackend, ChannelFactory, ResultChannel};
pub use config::AggregateConfig;
pub use coordinator::{run, run_with_channels};
pub use error::{AggregateError, ChannelError, WorkerError};
pub use planner::{plan, ChunkRange};
pub use processor::ChunkProcessor;
pub use record::{Extraction, RecordParser, VisitRecord};
pub use stats::{Aggregate, ChunkStats, MergedAggregate, RunReport};
