// tests/common/mod.rs
// Shared helpers for the integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use visitagg::record::trim_line_ending;
use visitagg::{Aggregate, Extraction, RecordParser};

/// Writes `content` as `access.log` inside a fresh temp directory.
pub fn write_log(content: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let input = dir.path().join("access.log");
    fs::write(&input, content).expect("Failed to write input log");
    (dir, input)
}

/// Single-threaded reference: one pass over every line of `content`.
pub fn sequential_json(content: &[u8], extraction: Extraction) -> String {
    let parser = RecordParser::new(extraction);
    let mut aggregate = Aggregate::new();
    for line in content.split_inclusive(|&b| b == b'\n') {
        if let Some(record) = parser.parse(trim_line_ending(line)) {
            aggregate.record(record);
        }
    }
    aggregate.into_sorted().to_json().expect("Failed to serialize reference")
}

pub fn read_output(path: &Path) -> String {
    fs::read_to_string(path).expect("Failed to read output")
}

pub fn dir_entries(path: &Path) -> Vec<PathBuf> {
    fs::read_dir(path)
        .expect("Failed to list dir")
        .map(|entry| entry.expect("Failed to read entry").path())
        .collect()
}
