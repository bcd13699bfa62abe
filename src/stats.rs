use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::record::VisitRecord;

/// Per-date visit counts of a single path, in first-seen order.
pub type DateCounts = IndexMap<String, u64>;

/// Worker-local visit counts: path -> date -> count.
///
/// Paths keep first-appearance order so that merging in worker order
/// reproduces the order a single sequential pass would have produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    paths: IndexMap<String, DateCounts>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: VisitRecord) {
        self.add(record.path, record.date, 1);
    }

    /// Adds `count` visits. Zero is ignored so that no entry ever holds 0.
    pub fn add(&mut self, path: String, date: String, count: u64) {
        if count == 0 {
            return;
        }
        *self.paths.entry(path).or_default().entry(date).or_insert(0) += count;
    }

    pub fn get(&self, path: &str, date: &str) -> Option<u64> {
        self.paths.get(path)?.get(date).copied()
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DateCounts)> {
        self.paths.iter()
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn visit_count(&self) -> u64 {
        self.paths.values().flat_map(|dates| dates.values()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Sums `other` into `self`.
    pub fn merge(&mut self, other: Aggregate) {
        for (path, dates) in other.paths {
            let target = self.paths.entry(path).or_default();
            for (date, count) in dates {
                *target.entry(date).or_insert(0) += count;
            }
        }
    }

    /// Consumes the aggregate, ordering each path's dates by string order.
    pub fn into_sorted(self) -> MergedAggregate {
        let paths = self
            .paths
            .into_iter()
            .map(|(path, dates)| (path, dates.into_iter().collect::<BTreeMap<_, _>>()))
            .collect();
        MergedAggregate { paths }
    }
}

/// Final, serialisable result: path -> (date ascending) -> count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MergedAggregate {
    paths: IndexMap<String, BTreeMap<String, u64>>,
}

impl MergedAggregate {
    pub fn dates(&self, path: &str) -> Option<&BTreeMap<String, u64>> {
        self.paths.get(path)
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn visit_count(&self) -> u64 {
        self.paths.values().flat_map(|dates| dates.values()).sum()
    }

    /// Pretty JSON, two-space indent, LF, no trailing newline.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Counters kept by one worker while scanning its range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    pub bytes: u64,
    pub lines: u64,
    pub skipped: u64,
}

impl ChunkStats {
    pub fn absorb(&mut self, other: &ChunkStats) {
        self.bytes += other.bytes;
        self.lines += other.lines;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub workers: usize,
    pub totals: ChunkStats,
    pub paths: usize,
    pub visits: u64,
    pub elapsed: Duration,
}
