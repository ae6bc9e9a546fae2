//! Prune command: cache garbage collection without a sync.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::gc::{self, PruneStats, format_size};
use crate::package::PackageFilter;

/// Keep only the newest version of every package in each of `cache_roots`.
///
/// Roots are processed one after another; a missing root is skipped with a
/// warning. Returns the stats summed over all roots.
pub fn prune(cache_roots: &[PathBuf], prefix: &str, dry_run: bool) -> Result<PruneStats> {
    let filter = PackageFilter::new(prefix);
    let mut total = PruneStats::default();

    for root in cache_roots {
        let stats = prune_root(root, &filter, dry_run)?;
        total += stats;
    }

    info!(
        roots = cache_roots.len(),
        removed = total.removed,
        retained = total.retained,
        freed = %format_size(total.bytes_freed),
        dry_run,
        "Cache pruning finished"
    );

    Ok(total)
}

fn prune_root(root: &Path, filter: &PackageFilter, dry_run: bool) -> Result<PruneStats> {
    let stats = gc::prune_cache_root(root, filter, dry_run)?;
    info!(
        root = %root.display(),
        removed = stats.removed,
        freed = %format_size(stats.bytes_freed),
        "Cache pruned"
    );
    Ok(stats)
}
