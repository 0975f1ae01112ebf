//! Decides whether a source directory gets an archive at all.

use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Ready(PathBuf),
    SkippedMissing,
    SkippedEmpty,
    SkippedNotDirectory,
}

/// Why a target produced no archive. Expected steady state, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Missing,
    Empty,
    NotDirectory,
}

impl SkipReason {
    pub fn describe(self) -> &'static str {
        match self {
            SkipReason::Missing => "source does not exist",
            SkipReason::Empty => "source directory is empty",
            SkipReason::NotDirectory => "source is not a directory",
        }
    }
}

/// Classify `source`. First match wins: missing, not a directory, empty, ready.
///
/// Symbolic links are followed. A path that cannot be inspected for any reason
/// other than not existing is reported `Ready`, so the compressor surfaces the
/// real problem as a per-target failure instead of a silent skip.
pub fn validate(source: &Path) -> ValidationResult {
    let metadata = match std::fs::metadata(source) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return ValidationResult::SkippedMissing,
        Err(_) => return ValidationResult::Ready(source.to_path_buf()),
    };

    if !metadata.is_dir() {
        return ValidationResult::SkippedNotDirectory;
    }

    match std::fs::read_dir(source) {
        Ok(mut entries) => {
            if entries.next().is_none() {
                ValidationResult::SkippedEmpty
            } else {
                ValidationResult::Ready(source.to_path_buf())
            }
        }
        Err(_) => ValidationResult::Ready(source.to_path_buf()),
    }
}
