use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::AggregateError;

/// Half-open byte interval `[start, end)` of the input owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Splits `[0, file_size)` into `worker_count` line-aligned ranges.
///
/// Every boundary after the first is found by seeking to `i * ceil(size / n)`
/// and skipping past the next `\n`, so a line always belongs to the range in
/// which it starts. Boundaries that fall at or past the end of the file
/// collapse into empty trailing ranges; those workers still run.
pub fn plan(path: &Path, file_size: u64, worker_count: usize) -> Result<Vec<ChunkRange>, AggregateError> {
    if worker_count == 0 {
        return Err(AggregateError::planning(path, "worker count must be greater than 0"));
    }

    let start_time = Instant::now();
    let ideal_chunk = file_size.div_ceil(worker_count as u64);

    let mut starts = Vec::with_capacity(worker_count);
    starts.push(0u64);

    if worker_count > 1 && file_size > 0 {
        let file = File::open(path).map_err(|e| AggregateError::planning(path, e))?;
        let mut reader = BufReader::new(file);
        let mut discarded = Vec::new();

        for i in 1..worker_count {
            let target = ideal_chunk * i as u64;
            let previous = starts[i - 1];

            let boundary = if target >= file_size {
                file_size
            } else if target < previous {
                // A single long line already swallowed this target.
                previous
            } else {
                reader
                    .seek(SeekFrom::Start(target))
                    .map_err(|e| AggregateError::planning(path, e))?;
                discarded.clear();
                let consumed = reader
                    .read_until(b'\n', &mut discarded)
                    .map_err(|e| AggregateError::planning(path, e))?;
                (target + consumed as u64).min(file_size)
            };

            starts.push(boundary.max(previous));
        }
    } else {
        starts.resize(worker_count, 0);
    }

    let ranges: Vec<ChunkRange> = starts
        .iter()
        .enumerate()
        .map(|(i, &start)| ChunkRange {
            start,
            end: starts.get(i + 1).copied().unwrap_or(file_size),
        })
        .collect();

    for (index, range) in ranges.iter().enumerate() {
        debug!(action = "plan", component = "chunk_planner", worker = index, start = range.start, end = range.end, "Planned chunk");
    }
    info!(
        action = "complete",
        component = "chunk_planner",
        file_size,
        worker_count,
        ideal_chunk,
        duration_ms = start_time.elapsed().as_millis(),
        "Chunk planning completed"
    );

    Ok(ranges)
}
