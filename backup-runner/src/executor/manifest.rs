//! Aggregate checksum manifest for a destination root.
//!
//! The manifest reflects the directory, not the run: every archive present at
//! the destination root when it is built gets exactly one line, including
//! archives left by earlier runs. The format is the one `sha512sum` writes, so
//! `sha512sum -c BACKUP.sha512sum` verifies it.

use crate::tools::digest::{is_digest, Digester};
use crate::utils::ManifestError;
use serde::Serialize;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One `digest  filename` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub digest: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}  {}\n", e.digest, e.file_name))
            .collect()
    }

    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut entries = Vec::new();

        for (index, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let malformed = || ManifestError::Malformed {
                line: index + 1,
                content: line.to_string(),
            };
            let (digest, file_name) = line.split_once("  ").ok_or_else(malformed)?;
            if !is_digest(digest) || file_name.is_empty() || file_name.contains('/') {
                return Err(malformed());
            }
            entries.push(ManifestEntry {
                digest: digest.to_string(),
                file_name: file_name.to_string(),
            });
        }

        Ok(Self { entries })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ManifestResult {
    Written { path: PathBuf, entries: usize },
    NoArchives,
}

/// Per-line result of re-checking a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifyStatus {
    Ok,
    Mismatch { actual: String },
    Missing,
    Unreadable { reason: String },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub entries: Vec<(String, VerifyStatus)>,

    /// Archives present in the destination but absent from the manifest
    pub unlisted: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.unlisted.is_empty() && self.entries.iter().all(|(_, s)| *s == VerifyStatus::Ok)
    }
}

#[derive(Debug, Clone)]
pub struct ManifestBuilder<D> {
    digester: D,
    extension: String,
    file_name: String,
}

impl<D: Digester> ManifestBuilder<D> {
    pub fn new(digester: D, extension: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            digester,
            extension: extension.into(),
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Archive file names directly under `root`, sorted lexically.
    pub fn list_archives(&self, root: &Path) -> Result<Vec<String>, ManifestError> {
        let scan_error = |source: std::io::Error| ManifestError::Scan {
            dir: root.to_path_buf(),
            source,
        };
        let suffix = format!(".{}", self.extension);
        let mut names = Vec::new();

        for entry in std::fs::read_dir(root).map_err(scan_error)? {
            let entry = entry.map_err(scan_error)?;

            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    if raw.to_string_lossy().ends_with(&suffix) {
                        return Err(ManifestError::InvalidFileName(
                            raw.to_string_lossy().to_string(),
                        ));
                    }
                    continue;
                }
            };

            if name.len() <= suffix.len() || !name.ends_with(&suffix) {
                continue;
            }
            // Follows symlinks; a dangling link is not an archive.
            if !entry.path().is_file() {
                continue;
            }
            if name.contains('\n') || name.contains('\r') {
                return Err(ManifestError::InvalidFileName(name));
            }

            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    /// Hash every archive under `root` and (over)write the manifest.
    ///
    /// Writes nothing when there are no archives. Any digest failure aborts the
    /// write, so a partial manifest never replaces a complete one.
    pub fn build(&self, root: &Path) -> Result<ManifestResult, ManifestError> {
        let names = self.list_archives(root)?;
        if names.is_empty() {
            info!("No archives in {}, manifest not written", root.display());
            return Ok(ManifestResult::NoArchives);
        }

        let mut manifest = Manifest::default();
        for name in names {
            debug!("Hashing {}", name);
            let digest = self
                .digester
                .digest(&root.join(&name))
                .map_err(|source| ManifestError::Digest {
                    file: name.clone(),
                    source,
                })?;
            manifest.entries.push(ManifestEntry {
                digest,
                file_name: name,
            });
        }

        let path = root.join(&self.file_name);
        self.write(root, &path, &manifest.render())?;

        info!(
            "Wrote manifest {} ({} archives)",
            path.display(),
            manifest.entries.len()
        );

        Ok(ManifestResult::Written {
            path,
            entries: manifest.entries.len(),
        })
    }

    /// Recompute every digest listed in the manifest at `root`.
    pub fn verify(&self, root: &Path) -> Result<VerifyReport, ManifestError> {
        let path = root.join(&self.file_name);
        let text = std::fs::read_to_string(&path).map_err(|source| ManifestError::Read {
            path: path.clone(),
            source,
        })?;
        let manifest = Manifest::parse(&text)?;

        let mut report = VerifyReport::default();
        for entry in &manifest.entries {
            let status = match self.digester.digest(&root.join(&entry.file_name)) {
                Ok(actual) if actual == entry.digest => VerifyStatus::Ok,
                Ok(actual) => VerifyStatus::Mismatch { actual },
                Err(e) if e.kind() == ErrorKind::NotFound => VerifyStatus::Missing,
                Err(e) => VerifyStatus::Unreadable {
                    reason: e.to_string(),
                },
            };
            report.entries.push((entry.file_name.clone(), status));
        }

        report.unlisted = self
            .list_archives(root)?
            .into_iter()
            .filter(|name| !manifest.entries.iter().any(|e| &e.file_name == name))
            .collect();

        Ok(report)
    }

    /// Temp file in the same directory, then rename over the old manifest.
    fn write(&self, root: &Path, path: &Path, contents: &str) -> Result<(), ManifestError> {
        let write_error = |source: std::io::Error| ManifestError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut partial = tempfile::Builder::new()
            .prefix(&format!(".{}.", self.file_name))
            .suffix(super::archiver::PARTIAL_SUFFIX)
            .tempfile_in(root)
            .map_err(write_error)?;
        partial.write_all(contents.as_bytes()).map_err(write_error)?;
        partial.as_file().sync_all().map_err(write_error)?;
        partial.persist(path).map_err(|e| write_error(e.error))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Sha512Digester;
    use std::fs;
    use std::io;
    use tempfile::TempDir;

    const MANIFEST: &str = "BACKUP.sha512sum";

    fn builder() -> ManifestBuilder<Sha512Digester> {
        ManifestBuilder::new(Sha512Digester, "tar.gz", MANIFEST)
    }

    /// Fails to hash one named file.
    struct FlakyDigester(&'static str);

    impl Digester for FlakyDigester {
        fn digest(&self, path: &Path) -> io::Result<String> {
            if path.ends_with(self.0) {
                return Err(io::Error::new(ErrorKind::PermissionDenied, "permission denied"));
            }
            Sha512Digester.digest(path)
        }
    }

    #[test]
    fn test_empty_destination_writes_nothing() -> anyhow::Result<()> {
        let dest = TempDir::new()?;

        assert_eq!(builder().build(dest.path())?, ManifestResult::NoArchives);
        assert_eq!(builder().build(dest.path())?, ManifestResult::NoArchives);
        assert!(!dest.path().join(MANIFEST).exists());
        Ok(())
    }

    #[test]
    fn test_lists_only_archives_sorted() -> anyhow::Result<()> {
        let dest = TempDir::new()?;
        fs::write(dest.path().join("SSHKeys_20240101T000000Z.tar.gz"), b"b")?;
        fs::write(dest.path().join("Pictures_20240102T000000Z.tar.gz"), b"a2")?;
        fs::write(dest.path().join("Pictures_20240101T000000Z.tar.gz"), b"a1")?;
        fs::write(dest.path().join("notes.txt"), b"x")?;
        fs::write(dest.path().join(".Pictures_x.tar.gz.abc123.partial"), b"x")?;
        fs::write(dest.path().join(".tar.gz"), b"x")?;
        fs::write(dest.path().join(MANIFEST), b"stale")?;
        fs::create_dir(dest.path().join("dir.tar.gz"))?;

        assert_eq!(
            builder().list_archives(dest.path())?,
            vec![
                "Pictures_20240101T000000Z.tar.gz",
                "Pictures_20240102T000000Z.tar.gz",
                "SSHKeys_20240101T000000Z.tar.gz",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_manifest_matches_sha512sum_format() -> anyhow::Result<()> {
        let dest = TempDir::new()?;
        fs::write(dest.path().join("Old_20200101T000000Z.tar.gz"), b"abc")?;

        let result = builder().build(dest.path())?;
        assert_eq!(
            result,
            ManifestResult::Written {
                path: dest.path().join(MANIFEST),
                entries: 1
            }
        );

        let text = fs::read_to_string(dest.path().join(MANIFEST))?;
        assert_eq!(
            text,
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f  \
             Old_20200101T000000Z.tar.gz\n"
        );
        Ok(())
    }

    #[test]
    fn test_rebuild_is_byte_identical() -> anyhow::Result<()> {
        let dest = TempDir::new()?;
        fs::write(dest.path().join("A_20240101T000000Z.tar.gz"), b"one")?;
        fs::write(dest.path().join("B_20240101T000000Z.tar.gz"), b"two")?;

        builder().build(dest.path())?;
        let first = fs::read(dest.path().join(MANIFEST))?;
        builder().build(dest.path())?;
        let second = fs::read(dest.path().join(MANIFEST))?;

        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_manifest_tracks_directory_contents() -> anyhow::Result<()> {
        let dest = TempDir::new()?;
        fs::write(dest.path().join("A_20240101T000000Z.tar.gz"), b"one")?;
        fs::write(dest.path().join("B_20240101T000000Z.tar.gz"), b"two")?;
        builder().build(dest.path())?;

        fs::remove_file(dest.path().join("A_20240101T000000Z.tar.gz"))?;
        builder().build(dest.path())?;

        let manifest = Manifest::parse(&fs::read_to_string(dest.path().join(MANIFEST))?)?;
        let names: Vec<_> = manifest.entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, vec!["B_20240101T000000Z.tar.gz"]);
        Ok(())
    }

    #[test]
    fn test_digest_failure_keeps_previous_manifest() -> anyhow::Result<()> {
        let dest = TempDir::new()?;
        fs::write(dest.path().join("A_20240101T000000Z.tar.gz"), b"one")?;
        builder().build(dest.path())?;
        let before = fs::read(dest.path().join(MANIFEST))?;

        fs::write(dest.path().join("B_20240101T000000Z.tar.gz"), b"two")?;
        let flaky = ManifestBuilder::new(FlakyDigester("B_20240101T000000Z.tar.gz"), "tar.gz", MANIFEST);
        let result = flaky.build(dest.path());

        assert!(matches!(
            result,
            Err(ManifestError::Digest { ref file, .. }) if file == "B_20240101T000000Z.tar.gz"
        ));
        assert_eq!(fs::read(dest.path().join(MANIFEST))?, before);
        Ok(())
    }

    #[test]
    fn test_missing_destination_is_scan_error() {
        let result = builder().build(Path::new("/nonexistent/backup/root"));
        assert!(matches!(result, Err(ManifestError::Scan { .. })));
    }

    #[test]
    fn test_newline_in_archive_name_is_rejected() -> anyhow::Result<()> {
        let dest = TempDir::new()?;
        fs::write(dest.path().join("bad\nname.tar.gz"), b"x")?;

        assert!(matches!(
            builder().build(dest.path()),
            Err(ManifestError::InvalidFileName(_))
        ));
        assert!(!dest.path().join(MANIFEST).exists());
        Ok(())
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Manifest::parse("").unwrap().entries.is_empty());
        assert!(matches!(
            Manifest::parse("not a manifest line"),
            Err(ManifestError::Malformed { line: 1, .. })
        ));
        assert!(Manifest::parse(&format!("{}  x.tar.gz\n", "a".repeat(64))).is_err());
    }

    #[test]
    fn test_verify_detects_problems() -> anyhow::Result<()> {
        let dest = TempDir::new()?;
        fs::write(dest.path().join("A_20240101T000000Z.tar.gz"), b"one")?;
        fs::write(dest.path().join("B_20240101T000000Z.tar.gz"), b"two")?;
        fs::write(dest.path().join("C_20240101T000000Z.tar.gz"), b"three")?;
        builder().build(dest.path())?;

        let clean = builder().verify(dest.path())?;
        assert!(clean.is_clean());
        assert_eq!(clean.entries.len(), 3);

        fs::write(dest.path().join("A_20240101T000000Z.tar.gz"), b"tampered")?;
        fs::remove_file(dest.path().join("B_20240101T000000Z.tar.gz"))?;
        fs::write(dest.path().join("D_20240101T000000Z.tar.gz"), b"four")?;

        let report = builder().verify(dest.path())?;
        assert!(!report.is_clean());
        assert!(matches!(report.entries[0].1, VerifyStatus::Mismatch { .. }));
        assert_eq!(report.entries[1].1, VerifyStatus::Missing);
        assert_eq!(report.entries[2].1, VerifyStatus::Ok);
        assert_eq!(report.unlisted, vec!["D_20240101T000000Z.tar.gz"]);
        Ok(())
    }

    #[test]
    fn test_verify_without_manifest() {
        let dest = TempDir::new().unwrap();
        assert!(matches!(
            builder().verify(dest.path()),
            Err(ManifestError::Read { .. })
        ));
    }
}
