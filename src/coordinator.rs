use std::any::Any;
use std::fs;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{error, info};

use crate::channel::{ChannelFactory, ResultChannel};
use crate::config::AggregateConfig;
use crate::error::{AggregateError, WorkerError};
use crate::planner::{self, ChunkRange};
use crate::processor::ChunkProcessor;
use crate::record::RecordParser;
use crate::stats::{Aggregate, ChunkStats, MergedAggregate, RunReport};

/// Aggregates `input` with the channel backend named in `config` and writes
/// the JSON result to `output`. Either the whole result is written or
/// `output` is left untouched.
pub fn run(input: &Path, output: &Path, config: &AggregateConfig) -> Result<RunReport, AggregateError> {
    let ranges = plan_input(input, config.workers)?;
    let factory = config
        .channel
        .factory(config.channel_capacity, config.temp_dir.as_deref())
        .map_err(|e| AggregateError::Spawn(format!("cannot create result channels: {e}")))?;
    execute(input, output, config, &ranges, factory.as_ref())
}

/// Same as [`run`], with caller-supplied result channels.
pub fn run_with_channels(
    input: &Path,
    output: &Path,
    config: &AggregateConfig,
    factory: &dyn ChannelFactory,
) -> Result<RunReport, AggregateError> {
    let ranges = plan_input(input, config.workers)?;
    execute(input, output, config, &ranges, factory)
}

fn plan_input(input: &Path, workers: usize) -> Result<Vec<ChunkRange>, AggregateError> {
    let file_size = fs::metadata(input)
        .map_err(|e| AggregateError::planning(input, e))?
        .len();
    planner::plan(input, file_size, workers)
}

fn execute(
    input: &Path,
    output: &Path,
    config: &AggregateConfig,
    ranges: &[ChunkRange],
    factory: &dyn ChannelFactory,
) -> Result<RunReport, AggregateError> {
    let start_time = Instant::now();
    info!(
        action = "start",
        component = "coordinator",
        input = ?input,
        output = ?output,
        workers = ranges.len(),
        backend = factory.backend_name(),
        "Starting aggregation run"
    );

    let mut channels = open_channels(factory, ranges.len())?;
    let outcomes = run_workers(input, ranges, config, &mut channels)?;

    let mut totals = ChunkStats::default();
    let mut first_failure = None;
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(stats) => totals.absorb(&stats),
            Err(source) => {
                error!(action = "fail", component = "worker", worker = index, error = %source, "Worker failed");
                if first_failure.is_none() {
                    first_failure = Some(AggregateError::Worker { index, source });
                }
            }
        }
    }
    if let Some(failure) = first_failure {
        return Err(failure);
    }

    let merge_start = Instant::now();
    let mut merged = Aggregate::new();
    for (index, channel) in channels.iter_mut().enumerate() {
        let aggregate = channel.receive().map_err(|e| AggregateError::Worker {
            index,
            source: WorkerError::Channel(e),
        })?;
        merged.merge(aggregate);
    }
    let merged = merged.into_sorted();
    info!(
        action = "merge",
        component = "coordinator",
        paths = merged.path_count(),
        visits = merged.visit_count(),
        duration_ms = merge_start.elapsed().as_millis(),
        "Merged worker results"
    );

    write_output(output, &merged)?;

    let report = RunReport {
        workers: ranges.len(),
        totals,
        paths: merged.path_count(),
        visits: merged.visit_count(),
        elapsed: start_time.elapsed(),
    };
    info!(
        action = "complete",
        component = "coordinator",
        lines = report.totals.lines,
        skipped = report.totals.skipped,
        paths = report.paths,
        visits = report.visits,
        duration_ms = report.elapsed.as_millis(),
        "Aggregation run completed"
    );
    Ok(report)
}

fn open_channels(factory: &dyn ChannelFactory, count: usize) -> Result<Vec<Box<dyn ResultChannel>>, AggregateError> {
    (0..count)
        .map(|index| {
            factory
                .open(index)
                .map_err(|e| AggregateError::Spawn(format!("cannot open result channel for worker {index}: {e}")))
        })
        .collect()
}

/// Runs one task per range on a pool sized to the range count and blocks
/// until every task has finished. Outcomes are returned in worker order.
fn run_workers(
    input: &Path,
    ranges: &[ChunkRange],
    config: &AggregateConfig,
    channels: &mut [Box<dyn ResultChannel>],
) -> Result<Vec<Result<ChunkStats, WorkerError>>, AggregateError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ranges.len())
        .thread_name(|i| format!("visitagg-worker-{i}"))
        .build()
        .map_err(|e| AggregateError::Spawn(e.to_string()))?;

    let parser = RecordParser::new(config.extraction);
    let processor = ChunkProcessor::new(&parser, config.window_bytes);
    let mut outcomes: Vec<Option<Result<ChunkStats, WorkerError>>> = (0..ranges.len()).map(|_| None).collect();

    let processing_start = Instant::now();
    pool.scope(|scope| {
        let slots = channels.iter_mut().zip(outcomes.iter_mut());
        for (index, (range, (channel, outcome))) in ranges.iter().zip(slots).enumerate() {
            let processor = &processor;
            let range = *range;
            scope.spawn(move |_| {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_worker(index, input, range, processor, channel.as_mut())
                }));
                *outcome = Some(result.unwrap_or_else(|payload| Err(WorkerError::Panicked(panic_message(&*payload)))));
            });
        }
    });
    info!(
        action = "join",
        component = "coordinator",
        workers = ranges.len(),
        duration_ms = processing_start.elapsed().as_millis(),
        "All workers finished"
    );

    Ok(outcomes
        .into_iter()
        .map(|outcome| outcome.unwrap_or_else(|| Err(WorkerError::Panicked("worker never reported".to_string()))))
        .collect())
}

fn run_worker(
    index: usize,
    input: &Path,
    range: ChunkRange,
    processor: &ChunkProcessor<'_>,
    channel: &mut dyn ResultChannel,
) -> Result<ChunkStats, WorkerError> {
    let (aggregate, stats) = processor.process(input, range).map_err(|source| WorkerError::Read {
        start: range.start,
        end: range.end,
        source,
    })?;
    channel.send(&aggregate)?;
    info!(
        action = "complete",
        component = "worker",
        worker = index,
        bytes = stats.bytes,
        lines = stats.lines,
        skipped = stats.skipped,
        paths = aggregate.path_count(),
        "Worker finished"
    );
    Ok(stats)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Writes next to `output` and renames over it, so readers never observe a
/// partial file.
fn write_output(output: &Path, merged: &MergedAggregate) -> Result<(), AggregateError> {
    let as_output_error = |source: io::Error| AggregateError::Output {
        path: output.to_path_buf(),
        source,
    };

    let json = merged.to_json().map_err(|e| as_output_error(e.into()))?;
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = NamedTempFile::new_in(dir).map_err(as_output_error)?;
    staged.write_all(json.as_bytes()).map_err(as_output_error)?;
    staged.as_file().sync_all().map_err(as_output_error)?;
    staged.persist(output).map_err(|e| as_output_error(e.error))?;

    info!(action = "write", component = "output", path = ?output, bytes = json.len(), "Output written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelBackend;
    use std::io::Write;

    const LOG: &str = "GET /index.html HTTP/1,2024-03-01T00:00:00Z\n\
                       GET /index.html HTTP/1,2024-03-01T11:00:00Z\n\
                       GET /about.html HTTP/1,2024-03-02T00:00:00Z\n";

    #[test]
    fn test_run_matches_expected_counts_for_any_worker_count() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("access.log");
        fs::File::create(&input).unwrap().write_all(LOG.as_bytes()).unwrap();

        let expected = "{\n  \"/index.html\": {\n    \"2024-03-01\": 2\n  },\n  \"/about.html\": {\n    \"2024-03-02\": 1\n  }\n}";
        for workers in 1..=5 {
            for backend in [ChannelBackend::Memory, ChannelBackend::TempFile] {
                let output = dir.path().join(format!("out-{workers}-{backend:?}.json"));
                let config = AggregateConfig::default().with_workers(workers).with_channel(backend);
                let report = run(&input, &output, &config).unwrap();

                assert_eq!(report.workers, workers);
                assert_eq!(report.visits, 3);
                assert_eq!(report.totals.lines, 3);
                assert_eq!(fs::read_to_string(&output).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_missing_input_is_planning_error_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.json");
        let err = run(&dir.path().join("missing.log"), &output, &AggregateConfig::default()).unwrap_err();
        assert!(matches!(err, AggregateError::Planning { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
    }
}
