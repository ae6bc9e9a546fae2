use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::PruneStats;
use crate::error::{Result, SyncError, join_branches};
use crate::package::{ARCHIVE_EXTENSION, PackageIdentity};
use crate::resolver::VisitedSet;

/// Delete every archive under `destination` whose identity is not in
/// `visited`.
///
/// Must only run after resolution has fully finished. File names that do not
/// parse as `<name>.<version>.nupkg` are skipped rather than deleted. A
/// missing destination yields empty stats.
///
/// A file that cannot be removed does not stop the pass; all such failures
/// are returned together at the end.
pub fn prune_destination(
    destination: &Path,
    visited: &VisitedSet,
    dry_run: bool,
) -> Result<PruneStats> {
    let mut stats = PruneStats::default();
    if !destination.exists() {
        debug!(path = %destination.display(), "Destination does not exist, nothing to prune");
        return Ok(stats);
    }

    let mut failures = Vec::new();

    for entry in WalkDir::new(destination) {
        let entry = entry.map_err(|e| SyncError::walk(destination, e))?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_archive(path) {
            continue;
        }

        let Some(identity) = PackageIdentity::from_archive_path(path) else {
            warn!(path = %path.display(), "Skipping archive with unrecognized name");
            stats.skipped += 1;
            continue;
        };

        if visited.contains(&identity) {
            stats.retained += 1;
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if dry_run {
            info!(package = %identity, path = %path.display(), "Would remove stale archive");
        } else {
            if let Err(source) = fs::remove_file(path) {
                failures.push(Err(SyncError::io(path, source)));
                continue;
            }
            info!(package = %identity, path = %path.display(), "Removed stale archive");
        }
        stats.removed += 1;
        stats.bytes_freed += size;
    }

    join_branches(failures)?;
    Ok(stats)
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}
