//! Structured-output materialization: turning final stage text into files.
//!
//! Filename validation here is a security boundary, not a formatting check:
//! the generation service is untrusted and may emit absolute paths or
//! parent-directory traversals. Violating records are dropped and logged,
//! never fatal, and every write stays under the target directory.

use std::path::{Component, Path};
use tracing::{error, info, warn};

/// Sentinel line separating file blocks in the flat-text protocol.
pub const SENTINEL: &str = "###-###-END-OF-FILE-###-###";

/// Marker prefix carrying the filename on the first line of a block.
pub const FILENAME_PREFIX: &str = "FILENAME: ";

/// One output file: a validated-relative path and its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Relative path under the target directory.
    pub filename: String,
    /// File content.
    pub content: String,
}

impl FileRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Returns true when `filename` is non-empty, relative, and free of
/// parent-directory traversal segments.
#[must_use]
pub fn is_safe_filename(filename: &str) -> bool {
    if filename.trim().is_empty() {
        return false;
    }
    let path = Path::new(filename);
    if path.is_absolute() {
        return false;
    }
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Parses flat-text protocol output into file records.
///
/// A block ends at a line consisting of the literal [`SENTINEL`]; the
/// sentinel appearing inside a content line is content, not a separator.
/// The first line of each block must start with [`FILENAME_PREFIX`], the
/// remainder (trimmed) is the content. Malformed blocks are logged and
/// skipped.
#[must_use]
pub fn parse_flat_text(text: &str) -> Vec<FileRecord> {
    let mut records = Vec::new();
    let mut block_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim() == SENTINEL {
            if let Some(record) = parse_block(&block_lines.join("\n")) {
                records.push(record);
            }
            block_lines.clear();
        } else {
            block_lines.push(line);
        }
    }
    // Trailing block without a closing sentinel.
    if let Some(record) = parse_block(&block_lines.join("\n")) {
        records.push(record);
    }

    records
}

fn parse_block(block: &str) -> Option<FileRecord> {
    let block = block.trim();
    if block.is_empty() {
        return None;
    }

    let (first_line, rest) = split_first_line(block);
    let Some(raw_name) = first_line.strip_prefix(FILENAME_PREFIX) else {
        warn!(
            head = %first_line.chars().take(60).collect::<String>(),
            "Block without filename marker, skipping"
        );
        return None;
    };

    Some(FileRecord::new(raw_name.trim(), rest.trim()))
}

fn split_first_line(block: &str) -> (&str, &str) {
    match block.split_once('\n') {
        Some((first, rest)) => (first.trim_end(), rest),
        None => (block, ""),
    }
}

/// Encodes file records into the flat-text protocol; the inverse of
/// [`parse_flat_text`] up to the documented trim rules.
#[must_use]
pub fn encode_flat_text(records: &[FileRecord]) -> String {
    records
        .iter()
        .map(|r| format!("{FILENAME_PREFIX}{}\n{}\n{SENTINEL}\n", r.filename, r.content))
        .collect()
}

/// Drops records with unsafe or empty filenames or blank content, and
/// deduplicates by filename, last writer wins (documented source behavior).
#[must_use]
pub fn validate(records: Vec<FileRecord>) -> Vec<FileRecord> {
    let mut kept: Vec<FileRecord> = Vec::with_capacity(records.len());

    for record in records {
        if !is_safe_filename(&record.filename) {
            error!(filename = %record.filename, "Rejected unsafe filename");
            continue;
        }
        if record.content.trim().is_empty() {
            warn!(filename = %record.filename, "Rejected record with empty content");
            continue;
        }
        if let Some(existing) = kept.iter_mut().find(|r| r.filename == record.filename) {
            warn!(filename = %record.filename, "Duplicate filename, last writer wins");
            *existing = record;
        } else {
            kept.push(record);
        }
    }

    kept
}

/// Writes records under `dir`, creating it (and any record subdirectories)
/// if absent. Existing files are overwritten without warning.
///
/// Never fails: every per-record problem is logged and isolated, and the
/// call returns the number of files actually written.
#[must_use]
pub fn write_all(records: &[FileRecord], dir: &Path) -> usize {
    if let Err(e) = std::fs::create_dir_all(dir) {
        error!(dir = %dir.display(), error = %e, "Cannot create output directory");
        return 0;
    }

    let mut written = 0;
    for record in records {
        let path = dir.join(&record.filename);
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!(path = %path.display(), error = %e, "Cannot create parent directory");
                continue;
            }
        }
        match std::fs::write(&path, &record.content) {
            Ok(()) => {
                info!(path = %path.display(), "Wrote file");
                written += 1;
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to write file");
            }
        }
    }
    written
}

/// Validates, deduplicates and writes records; the materializer entry point.
#[must_use]
pub fn persist(records: Vec<FileRecord>, dir: &Path) -> usize {
    write_all(&validate(records), dir)
}
