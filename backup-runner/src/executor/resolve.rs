//! Catalog entry to filesystem path resolution. Pure: no I/O.

use crate::catalog::CatalogEntry;
use std::path::{Path, PathBuf};

/// Where a target is read from and where its archives go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Absolute source directory
    pub source: PathBuf,

    /// Destination root the archive is written into
    pub destination: PathBuf,

    /// Archive base name, e.g. "SSHKeys"
    pub archive_base: String,
}

impl ResolvedTarget {
    /// Destination archive base path, e.g. `/backup/SSHKeys`.
    pub fn archive_base_path(&self) -> PathBuf {
        self.destination.join(&self.archive_base)
    }
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    home: PathBuf,
    destination: PathBuf,
}

impl PathResolver {
    pub fn new(home: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn resolve(&self, entry: &CatalogEntry) -> ResolvedTarget {
        ResolvedTarget {
            source: self.expand(&entry.source),
            destination: self.destination.clone(),
            archive_base: entry.archive.clone(),
        }
    }

    /// `~` and relative sources are taken from the home directory.
    fn expand(&self, source: &str) -> PathBuf {
        if source == "~" {
            return self.home.clone();
        }
        if let Some(rest) = source.strip_prefix("~/") {
            return self.home.join(rest);
        }

        let path = Path::new(source);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.home.join(path)
        }
    }
}
