//! Source tree summaries for report lines.

use serde::Serialize;
use std::path::Path;
use walkdir::WalkDir;

/// File count and total size of a source tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub files: usize,
    pub bytes: u64,
}

/// Walk a directory tree and total up its regular files.
///
/// Symbolic links are not followed, matching what tar stores.
pub fn source_stats(root: &Path) -> std::io::Result<SourceStats> {
    let mut stats = SourceStats::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;

        if !entry.file_type().is_file() {
            continue;
        }

        stats.files += 1;
        stats.bytes += entry.metadata()?.len();
    }

    Ok(stats)
}
