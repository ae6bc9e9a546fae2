//! Garbage collection for the destination directory and the cache roots.
//!
//! Two independent passes:
//! - [`prune_destination`]: removes archives that the last resolution did
//!   not reach
//! - [`prune_cache_root`]: keeps only the newest version directory of each
//!   package in a cache root
//!
//! Both support dry-run mode, where removals are logged and counted but
//! nothing is deleted.
//!
//! # Example
//!
//! ```no_run
//! use nupkg_sync::gc::{format_size, prune_cache_root};
//! use nupkg_sync::package::PackageFilter;
//!
//! let stats = prune_cache_root(
//!     "/home/me/.nuget/packages".as_ref(),
//!     &PackageFilter::new("Scar"),
//!     false,
//! )?;
//! println!("Freed {}", format_size(stats.bytes_freed));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::ops::AddAssign;

mod cache;
mod destination;
mod size;

pub use cache::prune_cache_root;
pub use destination::prune_destination;
pub use size::format_size;

/// Statistics about one pruning pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Files or version directories removed (or that would be, in dry-run
    /// mode)
    pub removed: usize,
    /// Entries kept
    pub retained: usize,
    /// Entries left alone because they could not be interpreted
    pub skipped: usize,
    /// Total bytes freed
    pub bytes_freed: u64,
}

impl AddAssign for PruneStats {
    fn add_assign(&mut self, other: Self) {
        self.removed += other.removed;
        self.retained += other.retained;
        self.skipped += other.skipped;
        self.bytes_freed += other.bytes_freed;
    }
}
