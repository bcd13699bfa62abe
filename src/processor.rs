use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use crate::planner::ChunkRange;
use crate::record::{trim_line_ending, RecordParser};
use crate::stats::{Aggregate, ChunkStats};

/// Default read window per worker (1 MiB).
pub const DEFAULT_WINDOW_BYTES: usize = 1024 * 1024;

/// Scans one byte range of the input and counts its visits.
///
/// Every line that starts inside `[start, end)` is counted, and read to its
/// terminator even if that lies past `end`. Memory stays at one read window
/// plus the longest line, independent of the range length.
pub struct ChunkProcessor<'a> {
    parser: &'a RecordParser,
    window_bytes: usize,
}

impl<'a> ChunkProcessor<'a> {
    pub fn new(parser: &'a RecordParser, window_bytes: usize) -> Self {
        Self {
            parser,
            window_bytes: window_bytes.max(1),
        }
    }

    pub fn process(&self, path: &Path, range: ChunkRange) -> io::Result<(Aggregate, ChunkStats)> {
        let mut aggregate = Aggregate::new();
        let mut stats = ChunkStats::default();
        if range.is_empty() {
            return Ok((aggregate, stats));
        }

        let start_time = Instant::now();
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(range.start))?;
        let mut reader = BufReader::with_capacity(self.window_bytes, file);

        let mut position = range.start;
        let mut line = Vec::new();
        while position < range.end {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            position += read as u64;
            stats.lines += 1;

            match self.parser.parse(trim_line_ending(&line)) {
                Some(record) => aggregate.record(record),
                None => stats.skipped += 1,
            }
        }
        stats.bytes = position - range.start;

        debug!(
            action = "complete",
            component = "chunk_processor",
            start = range.start,
            end = range.end,
            bytes = stats.bytes,
            lines = stats.lines,
            skipped = stats.skipped,
            paths = aggregate.path_count(),
            duration_ms = start_time.elapsed().as_millis(),
            "Chunk processed"
        );
        Ok((aggregate, stats))
    }
}
