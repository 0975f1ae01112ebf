//! Run outcomes and their one-line renderings.

use super::archiver::ArchiveRecord;
use super::manifest::ManifestResult;
use super::validate::SkipReason;
use crate::fs::walker::SourceStats;
use crate::utils::format::{format_bytes, format_duration_ms};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TargetOutcome {
    Created(ArchiveRecord),
    Skipped(SkipReason),
    Failed { archive: PathBuf, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub name: String,
    pub source: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<SourceStats>,
    #[serde(flatten)]
    pub outcome: TargetOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub created: usize,
    pub skipped_missing: usize,
    pub skipped_empty: usize,
    pub skipped_not_directory: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_targets(targets: &[TargetReport]) -> Self {
        let mut summary = Self::default();
        for target in targets {
            match &target.outcome {
                TargetOutcome::Created(_) => summary.created += 1,
                TargetOutcome::Skipped(SkipReason::Missing) => summary.skipped_missing += 1,
                TargetOutcome::Skipped(SkipReason::Empty) => summary.skipped_empty += 1,
                TargetOutcome::Skipped(SkipReason::NotDirectory) => {
                    summary.skipped_not_directory += 1
                }
                TargetOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.created
            + self.skipped_missing
            + self.skipped_empty
            + self.skipped_not_directory
            + self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ManifestOutcome {
    Written { path: PathBuf, entries: usize },
    NoArchives,
    Failed { reason: String },
}

impl From<ManifestResult> for ManifestOutcome {
    fn from(result: ManifestResult) -> Self {
        match result {
            ManifestResult::Written { path, entries } => ManifestOutcome::Written { path, entries },
            ManifestResult::NoArchives => ManifestOutcome::NoArchives,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub destination: PathBuf,
    pub targets: Vec<TargetReport>,
    pub summary: RunSummary,
    pub manifest: ManifestOutcome,
}

impl RunReport {
    /// Per-target failures do not count against the run; a failed manifest does.
    pub fn is_success(&self) -> bool {
        !matches!(self.manifest, ManifestOutcome::Failed { .. })
    }
}

impl fmt::Display for TargetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            TargetOutcome::Created(record) => {
                write!(f, "created  {}: {}", self.name, record.file_name())?;
                if let Some(size) = record.size {
                    write!(f, " ({}", format_bytes(size))?;
                    if let Some(stats) = self.stats {
                        write!(f, " from {} files, {}", stats.files, format_bytes(stats.bytes))?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            TargetOutcome::Skipped(reason) => write!(
                f,
                "skipped  {}: {} ({})",
                self.name,
                reason.describe(),
                self.source.display()
            ),
            TargetOutcome::Failed { reason, .. } => {
                write!(f, "failed   {}: {}", self.name, reason)
            }
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} targets: {} created, {} skipped (missing), {} skipped (empty), \
             {} skipped (not a directory), {} failed",
            self.total(),
            self.created,
            self.skipped_missing,
            self.skipped_empty,
            self.skipped_not_directory,
            self.failed
        )
    }
}

impl fmt::Display for ManifestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestOutcome::Written { path, entries } => {
                write!(f, "manifest written: {} ({} archives)", path.display(), entries)
            }
            ManifestOutcome::NoArchives => write!(f, "manifest not written: no archives in destination"),
            ManifestOutcome::Failed { reason } => write!(f, "manifest FAILED: {}", reason),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for target in &self.targets {
            writeln!(f, "{}", target)?;
        }
        writeln!(f, "{} in {}", self.summary, format_duration_ms(self.duration_ms))?;
        write!(f, "{}", self.manifest)
    }
}
