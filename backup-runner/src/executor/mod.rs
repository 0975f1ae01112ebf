//! Backup run controller - Drives the catalog through the pipeline.
//!
//! For every catalog entry, in order: resolve paths, validate the source,
//! archive it if ready. A target's failure is recorded and the run moves on.
//! Once the whole catalog has been attempted, the manifest is built exactly
//! once over the destination root.

pub mod archiver;
pub mod manifest;
pub mod naming;
pub mod report;
pub mod resolve;
pub mod validate;

use crate::catalog::{Catalog, CatalogEntry};
use crate::fs::walker::{source_stats, SourceStats};
use crate::tools::{Compressor, Digester};
use crate::utils::RunError;
use archiver::{ArchiveOutcome, Archiver};
use chrono::Utc;
use manifest::ManifestBuilder;
use report::{ManifestOutcome, RunReport, RunSummary, TargetOutcome, TargetReport};
use resolve::PathResolver;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;
use validate::{validate, SkipReason, ValidationResult};

/// Lifecycle of a run. There is no aborted state: target failures never stop it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Completed(RunSummary),
}

/// Main run controller
pub struct BackupRun<C, D> {
    catalog: Catalog,
    resolver: PathResolver,
    archiver: Archiver<C>,
    manifest: ManifestBuilder<D>,
    cancel_token: CancellationToken,
    state: RunState,
}

impl<C, D> BackupRun<C, D>
where
    C: Compressor,
    D: Digester + Clone + 'static,
{
    pub fn new(
        catalog: Catalog,
        resolver: PathResolver,
        archiver: Archiver<C>,
        manifest: ManifestBuilder<D>,
    ) -> Self {
        Self {
            catalog,
            resolver,
            archiver,
            manifest,
            cancel_token: CancellationToken::new(),
            state: RunState::NotStarted,
        }
    }

    /// Attach a token that interrupts the run when cancelled.
    pub fn with_cancel(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Execute the run.
    ///
    /// Only an unusable destination root or an interruption end the run early.
    /// An interrupted run writes no manifest and removes its in-flight archive.
    pub async fn execute(&mut self) -> Result<RunReport, RunError> {
        if self.state != RunState::NotStarted {
            return Err(RunError::AlreadyStarted);
        }

        let destination = self.resolver.destination().to_path_buf();
        check_destination(&destination)?;

        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        self.state = RunState::Running;

        let report = self.run_catalog(run_id, destination).instrument(span).await?;

        self.state = RunState::Completed(report.summary);
        Ok(report)
    }

    async fn run_catalog(&self, run_id: Uuid, destination: PathBuf) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        let start = std::time::Instant::now();

        info!(
            "Starting backup of {} targets into {}",
            self.catalog.len(),
            destination.display()
        );

        let mut targets = Vec::with_capacity(self.catalog.len());
        for entry in self.catalog.entries() {
            if self.cancel_token.is_cancelled() {
                return Err(RunError::Interrupted);
            }

            let report = tokio::select! {
                report = self.process(entry).instrument(info_span!("target", name = %entry.name)) => report,
                _ = self.cancel_token.cancelled() => {
                    warn!("Interrupted while processing {}", entry.name);
                    return Err(RunError::Interrupted);
                }
            };
            targets.push(report);
        }

        // Barrier: every target has been attempted before the manifest starts.
        if self.cancel_token.is_cancelled() {
            return Err(RunError::Interrupted);
        }
        let manifest = self.build_manifest(&destination).await;

        let summary = RunSummary::from_targets(&targets);
        info!("Backup finished: {}", summary);

        Ok(RunReport {
            run_id,
            started_at,
            duration_ms: millis(start.elapsed()),
            destination,
            targets,
            summary,
            manifest,
        })
    }

    /// Resolve, validate and archive one catalog entry.
    async fn process(&self, entry: &CatalogEntry) -> TargetReport {
        let target = self.resolver.resolve(entry);

        let reason = match validate(&target.source) {
            ValidationResult::Ready(source) => {
                let stats = summarize(&source).await;
                let record = self.archiver.archive(&source, &target).await;
                let outcome = if let ArchiveOutcome::Failed(reason) = &record.outcome {
                    TargetOutcome::Failed {
                        archive: record.path.clone(),
                        reason: reason.clone(),
                    }
                } else {
                    info!("Created archive {}", record.path.display());
                    TargetOutcome::Created(record)
                };
                return TargetReport {
                    name: entry.name.clone(),
                    source,
                    stats,
                    outcome,
                };
            }
            ValidationResult::SkippedMissing => SkipReason::Missing,
            ValidationResult::SkippedEmpty => SkipReason::Empty,
            ValidationResult::SkippedNotDirectory => SkipReason::NotDirectory,
        };

        info!(
            "Skipping {}: {} ({})",
            entry.name,
            reason.describe(),
            target.source.display()
        );

        TargetReport {
            name: entry.name.clone(),
            source: target.source,
            stats: None,
            outcome: TargetOutcome::Skipped(reason),
        }
    }

    async fn build_manifest(&self, destination: &Path) -> ManifestOutcome {
        let builder = self.manifest.clone();
        let root = destination.to_path_buf();

        match tokio::task::spawn_blocking(move || builder.build(&root)).await {
            Ok(Ok(result)) => result.into(),
            Ok(Err(e)) => {
                error!("Manifest step failed: {}", e);
                ManifestOutcome::Failed {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                error!("Manifest task failed: {}", e);
                ManifestOutcome::Failed {
                    reason: format!("manifest task failed: {}", e),
                }
            }
        }
    }
}

/// File count and size of a source, for the report. Best effort.
async fn summarize(source: &Path) -> Option<SourceStats> {
    let path = source.to_path_buf();
    match tokio::task::spawn_blocking(move || source_stats(&path)).await {
        Ok(Ok(stats)) => Some(stats),
        Ok(Err(e)) => {
            debug!("Could not summarize {}: {}", source.display(), e);
            None
        }
        Err(e) => {
            debug!("Summary task failed for {}: {}", source.display(), e);
            None
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// The destination root must already exist as an absolute directory.
fn check_destination(path: &Path) -> Result<(), RunError> {
    let unusable = |reason: String| RunError::Destination {
        path: path.to_path_buf(),
        reason,
    };

    if !path.is_absolute() {
        return Err(unusable("not an absolute path".to_string()));
    }

    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(unusable("not a directory".to_string())),
        Err(e) => Err(unusable(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::archiver::tests::{FakeCompressor, FixedClock};
    use super::*;
    use crate::config::TargetConfig;
    use crate::tools::Sha512Digester;
    use crate::utils::CompressError;
    use chrono::TimeZone;
    use std::fs;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tempfile::TempDir;

    const MANIFEST: &str = "BACKUP.sha512sum";

    fn catalog(entries: &[(&str, &str, &str)]) -> Catalog {
        let targets: Vec<TargetConfig> = entries
            .iter()
            .map(|(name, source, archive)| TargetConfig {
                name: name.to_string(),
                source: source.to_string(),
                archive: archive.to_string(),
            })
            .collect();
        Catalog::from_targets(&targets).unwrap()
    }

    fn run<C: Compressor>(
        catalog: Catalog,
        home: &Path,
        dest: &Path,
        compressor: C,
    ) -> BackupRun<C, Sha512Digester> {
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()));
        BackupRun::new(
            catalog,
            PathResolver::new(home, dest),
            Archiver::new(compressor, clock, "tar.gz"),
            ManifestBuilder::new(Sha512Digester, "tar.gz", MANIFEST),
        )
    }

    #[tokio::test]
    async fn test_state_machine() -> anyhow::Result<()> {
        let home = TempDir::new()?;
        let dest = TempDir::new()?;
        let mut backup = run(
            catalog(&[("Ghost", "NoSuchDir", "Ghost")]),
            home.path(),
            dest.path(),
            FakeCompressor::default(),
        );

        assert_eq!(backup.state(), &RunState::NotStarted);
        let report = backup.execute().await?;
        assert_eq!(backup.state(), &RunState::Completed(report.summary));

        assert!(matches!(backup.execute().await, Err(RunError::AlreadyStarted)));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_source_never_reaches_compressor() -> anyhow::Result<()> {
        let home = TempDir::new()?;
        let dest = TempDir::new()?;
        let mut backup = run(
            catalog(&[("Ghost", "NoSuchDir", "Ghost")]),
            home.path(),
            dest.path(),
            FakeCompressor::default(),
        );

        let report = backup.execute().await?;

        assert_eq!(report.summary.skipped_missing, 1);
        assert_eq!(backup.archiver.compressor().calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.manifest, ManifestOutcome::NoArchives);
        assert!(!dest.path().join(MANIFEST).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_is_isolated() -> anyhow::Result<()> {
        let home = TempDir::new()?;
        let dest = TempDir::new()?;
        for dir in ["Locked", "Pictures"] {
            fs::create_dir(home.path().join(dir))?;
            fs::write(home.path().join(dir).join("file"), b"data")?;
        }
        let compressor = FakeCompressor {
            fail_on: Some("Locked".to_string()),
            ..Default::default()
        };
        let mut backup = run(
            catalog(&[("Locked", "Locked", "Locked"), ("Pictures", "Pictures", "Pictures")]),
            home.path(),
            dest.path(),
            compressor,
        );

        let report = backup.execute().await?;

        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.created, 1);
        assert!(report.is_success());
        assert!(matches!(report.targets[0].outcome, TargetOutcome::Failed { .. }));
        assert!(matches!(report.targets[1].outcome, TargetOutcome::Created(_)));
        assert_eq!(
            report.manifest,
            ManifestOutcome::Written {
                path: dest.path().join(MANIFEST),
                entries: 1
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_destination_is_run_error() -> anyhow::Result<()> {
        let home = TempDir::new()?;
        let file = home.path().join("not-a-dir");
        fs::write(&file, b"x")?;

        for dest in [home.path().join("missing"), file, PathBuf::from("relative/dest")] {
            let mut backup = run(
                catalog(&[("Ghost", "NoSuchDir", "Ghost")]),
                home.path(),
                &dest,
                FakeCompressor::default(),
            );
            assert!(matches!(backup.execute().await, Err(RunError::Destination { .. })));
            assert_eq!(backup.state(), &RunState::NotStarted);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() -> anyhow::Result<()> {
        let home = TempDir::new()?;
        let dest = TempDir::new()?;
        fs::create_dir(home.path().join("Pictures"))?;
        fs::write(home.path().join("Pictures/a.png"), b"x")?;

        let token = CancellationToken::new();
        token.cancel();
        let mut backup = run(
            catalog(&[("Pictures", "Pictures", "Pictures")]),
            home.path(),
            dest.path(),
            FakeCompressor::default(),
        )
        .with_cancel(token);

        assert!(matches!(backup.execute().await, Err(RunError::Interrupted)));
        assert_eq!(fs::read_dir(dest.path())?.count(), 0);
        Ok(())
    }

    /// Writes part of an archive, then never finishes.
    struct StallingCompressor;

    impl Compressor for StallingCompressor {
        async fn compress(&self, _source: &Path, output: &Path) -> Result<(), CompressError> {
            tokio::fs::write(output, b"partial tar stream").await?;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_interrupt_during_compression_removes_partial_archive() -> anyhow::Result<()> {
        let home = TempDir::new()?;
        let dest = TempDir::new()?;
        for dir in ["Pictures", "Music"] {
            fs::create_dir(home.path().join(dir))?;
            fs::write(home.path().join(dir).join("file"), b"data")?;
        }
        fs::write(dest.path().join("Old_20200101T000000Z.tar.gz"), b"previous run")?;

        let token = CancellationToken::new();
        let mut backup = run(
            catalog(&[("Pictures", "Pictures", "Pictures"), ("Music", "Music", "Music")]),
            home.path(),
            dest.path(),
            StallingCompressor,
        )
        .with_cancel(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            token.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(30), backup.execute()).await?;
        canceller.await?;

        assert!(matches!(result, Err(RunError::Interrupted)));
        assert_eq!(backup.state(), &RunState::Running);

        let names: Vec<String> = fs::read_dir(dest.path())?
            .map(|e| e.map(|e| e.file_name().to_string_lossy().to_string()))
            .collect::<Result<_, _>>()?;
        assert_eq!(names, vec!["Old_20200101T000000Z.tar.gz"]);
        Ok(())
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
