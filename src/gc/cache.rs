use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::PruneStats;
use super::size::calculate_size;
use crate::error::{Result, SyncError, join_branches};
use crate::package::{PackageFilter, compare_versions};

/// Keep only the newest version directory of every package in `cache_root`.
///
/// Package directories not accepted by `filter` are left untouched. Version
/// directories are ordered with [`compare_versions`], so `2.10.0` is newer
/// than `2.9.0`. A missing cache root is logged and treated as empty.
///
/// Package directories are processed in parallel on the current rayon pool.
pub fn prune_cache_root(
    cache_root: &Path,
    filter: &PackageFilter,
    dry_run: bool,
) -> Result<PruneStats> {
    if !cache_root.is_dir() {
        warn!(path = %cache_root.display(), "Cache root does not exist, skipping");
        return Ok(PruneStats::default());
    }

    let packages: Vec<PathBuf> = subdirectories(cache_root)?
        .into_iter()
        .filter(|dir| dir_name(dir).is_some_and(|name| filter.matches(name)))
        .collect();
    debug!(
        path = %cache_root.display(),
        count = packages.len(),
        "Pruning cache root"
    );

    let results: Vec<Result<PruneStats>> = packages
        .par_iter()
        .map(|package| prune_package(package, dry_run))
        .collect();

    let mut stats = PruneStats::default();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(package_stats) => stats += package_stats,
            Err(e) => failures.push(Err(e)),
        }
    }

    join_branches(failures)?;
    Ok(stats)
}

fn prune_package(package: &Path, dry_run: bool) -> Result<PruneStats> {
    let mut stats = PruneStats::default();
    let mut versions: Vec<(String, PathBuf)> = Vec::new();
    for dir in subdirectories(package)? {
        match dir_name(&dir) {
            Some(name) => versions.push((name.to_string(), dir)),
            None => {
                warn!(path = %dir.display(), "Version directory name is not valid UTF-8, skipping");
                stats.skipped += 1;
            }
        }
    }
    // Newest first
    versions.sort_by(|(a, _), (b, _)| compare_versions(b, a));

    let mut versions = versions.into_iter().map(|(_, dir)| dir);
    let Some(newest) = versions.next() else {
        return Ok(stats);
    };
    stats.retained += 1;
    debug!(path = %newest.display(), "Keeping newest version");

    for superseded in versions {
        let size = calculate_size(&superseded)?;
        if dry_run {
            info!(path = %superseded.display(), "Would remove superseded version");
        } else {
            fs::remove_dir_all(&superseded).map_err(|e| SyncError::io(&superseded, e))?;
            info!(path = %superseded.display(), "Removed superseded version");
        }
        stats.removed += 1;
        stats.bytes_freed += size;
    }

    Ok(stats)
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| SyncError::io(dir, e))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SyncError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| SyncError::io(entry.path(), e))?;
        if file_type.is_dir() {
            dirs.push(entry.path());
        }
    }

    Ok(dirs)
}

fn dir_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}
