//! Archiver: one validated source directory in, one archive file out.
//!
//! The compressor writes into a hidden temporary file inside the destination
//! root. Only after it reports success is that file renamed to its final,
//! timestamped name, so an interrupted run never leaves a half-written archive
//! under a name the manifest would pick up.

use super::naming::{self, Clock};
use super::resolve::ResolvedTarget;
use crate::tools::Compressor;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Suffix of in-progress archive files. Never matches an archive extension.
pub const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ArchiveOutcome {
    Created,
    Failed(String),
}

/// Result of one archive attempt. Lives for the duration of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveRecord {
    pub base_name: String,
    pub timestamp: String,
    pub path: PathBuf,
    pub size: Option<u64>,
    pub outcome: ArchiveOutcome,
}

impl ArchiveRecord {
    pub fn is_created(&self) -> bool {
        self.outcome == ArchiveOutcome::Created
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

pub struct Archiver<C> {
    compressor: C,
    clock: Arc<dyn Clock>,
    extension: &'static str,
    check_output: bool,
}

impl<C: Compressor> Archiver<C> {
    pub fn new(compressor: C, clock: Arc<dyn Clock>, extension: &'static str) -> Self {
        Self {
            compressor,
            clock,
            extension,
            check_output: true,
        }
    }

    /// Toggle the zero-byte output check.
    pub fn with_output_check(mut self, enabled: bool) -> Self {
        self.check_output = enabled;
        self
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    pub fn compressor(&self) -> &C {
        &self.compressor
    }

    /// Archive a source that validated as `Ready`.
    ///
    /// Never returns an error: failures are recorded in the outcome.
    pub async fn archive(&self, source: &Path, target: &ResolvedTarget) -> ArchiveRecord {
        // Stamp at creation time, not run start.
        let now = self.clock.now();
        let file_name = naming::archive_file_name(&target.archive_base, now, self.extension);
        let path = target.destination.join(&file_name);

        let written = self
            .write_archive(source, &target.destination, &file_name, &path)
            .await;
        let (size, outcome) = match written {
            Ok(size) => (Some(size), ArchiveOutcome::Created),
            Err(reason) => {
                warn!("Failed to archive {}: {}", source.display(), reason);
                (None, ArchiveOutcome::Failed(reason))
            }
        };

        ArchiveRecord {
            base_name: target.archive_base.clone(),
            timestamp: naming::timestamp(now),
            path,
            size,
            outcome,
        }
    }

    async fn write_archive(
        &self,
        source: &Path,
        destination: &Path,
        file_name: &str,
        path: &Path,
    ) -> Result<u64, String> {
        // Removed on drop unless persisted, including when this future is dropped.
        let partial = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(destination)
            .map_err(|e| {
                format!(
                    "cannot create temporary file in {}: {}",
                    destination.display(),
                    e
                )
            })?;

        debug!("Writing {} via {}", file_name, partial.path().display());

        self.compressor
            .compress(source, partial.path())
            .await
            .map_err(|e| e.to_string())?;

        let size = tokio::fs::metadata(partial.path())
            .await
            .map_err(|e| format!("cannot inspect compressor output: {}", e))?
            .len();

        if self.check_output && size == 0 {
            return Err("compressor produced an empty archive".to_string());
        }

        partial.persist_noclobber(path).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                format!("archive {} already exists", path.display())
            } else {
                format!("cannot move archive into place: {}", e.error)
            }
        })?;

        Ok(size)
    }
}
