//! Sync command: resolve, then prune the destination, then prune the caches.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::error::{Result, SyncError};
use crate::gc::{self, PruneStats, format_size};
use crate::materialize::EntryExtractor;
use crate::package::PackageFilter;
use crate::resolver::{ResolveSummary, Resolver};

/// Name of the destination directory created inside the source directory
pub const DEFAULT_DESTINATION_DIR: &str = "Nuget";
/// Default project manifest extension
pub const DEFAULT_MANIFEST_EXTENSION: &str = "csproj";

/// What a sync run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Number of project manifests found
    pub manifests: usize,
    /// Resolution counters
    pub resolve: ResolveSummary,
    /// Destination pruning
    pub destination: PruneStats,
    /// Cache pruning, summed over all cache roots
    pub cache: PruneStats,
}

pub struct Synchronize<'a> {
    source_dir: &'a Path,
    destination: PathBuf,
    cache_roots: &'a [PathBuf],
    filter: PackageFilter,
    manifest_extension: &'a str,
    jobs: Option<usize>,
    dry_run: bool,
    skip_cache_gc: bool,
    extractor: Option<Box<dyn EntryExtractor>>,
}

pub struct SynchronizeBuilder<'a> {
    source_dir: Option<&'a Path>,
    destination: Option<&'a Path>,
    cache_roots: &'a [PathBuf],
    prefix: &'a str,
    manifest_extension: &'a str,
    jobs: Option<usize>,
    dry_run: bool,
    skip_cache_gc: bool,
    extractor: Option<Box<dyn EntryExtractor>>,
}

impl Default for SynchronizeBuilder<'_> {
    fn default() -> Self {
        Self {
            source_dir: None,
            destination: None,
            cache_roots: &[],
            prefix: "",
            manifest_extension: DEFAULT_MANIFEST_EXTENSION,
            jobs: None,
            dry_run: false,
            skip_cache_gc: false,
            extractor: None,
        }
    }
}

impl<'a> SynchronizeBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_dir(mut self, path: &'a Path) -> Self {
        self.source_dir = Some(path);
        self
    }

    /// Destination directory; defaults to `<source_dir>/Nuget`
    pub fn destination(mut self, path: Option<&'a Path>) -> Self {
        self.destination = path;
        self
    }

    pub fn cache_roots(mut self, roots: &'a [PathBuf]) -> Self {
        self.cache_roots = roots;
        self
    }

    pub fn prefix(mut self, prefix: &'a str) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn manifest_extension(mut self, extension: &'a str) -> Self {
        self.manifest_extension = extension;
        self
    }

    /// Worker threads; `None` uses one per logical CPU
    pub fn jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn skip_cache_gc(mut self, skip: bool) -> Self {
        self.skip_cache_gc = skip;
        self
    }

    pub fn extractor(mut self, extractor: impl EntryExtractor + 'static) -> Self {
        self.extractor = Some(Box::new(extractor));
        self
    }

    pub fn build(self) -> Result<Synchronize<'a>> {
        let source_dir = self
            .source_dir
            .ok_or_else(|| SyncError::ConfigError("source_dir is required".to_string()))?;
        let destination = self
            .destination
            .map(Path::to_path_buf)
            .unwrap_or_else(|| source_dir.join(DEFAULT_DESTINATION_DIR));
        let manifest_extension = self.manifest_extension.trim_start_matches('.');
        if manifest_extension.is_empty() {
            return Err(SyncError::ConfigError(
                "manifest extension must not be empty".to_string(),
            ));
        }
        if self.jobs == Some(0) {
            return Err(SyncError::ConfigError(
                "jobs must be at least 1".to_string(),
            ));
        }

        Ok(Synchronize {
            source_dir,
            destination,
            cache_roots: self.cache_roots,
            filter: PackageFilter::new(self.prefix),
            manifest_extension,
            jobs: self.jobs,
            dry_run: self.dry_run,
            skip_cache_gc: self.skip_cache_gc,
            extractor: self.extractor,
        })
    }
}

impl<'a> Synchronize<'a> {
    pub fn builder() -> SynchronizeBuilder<'a> {
        SynchronizeBuilder::new()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Execute the sync.
    ///
    /// Garbage collection only runs when every dependency branch succeeded;
    /// an incomplete closure would make live archives look stale.
    pub fn run(self) -> Result<SyncReport> {
        if !self.source_dir.is_dir() {
            return Err(SyncError::SourceDirNotFound(self.source_dir.to_path_buf()));
        }

        let manifests =
            discover_manifests(self.source_dir, self.manifest_extension, &self.destination)?;
        info!(
            source = %self.source_dir.display(),
            count = manifests.len(),
            "Found project manifests"
        );

        let scratch = tempfile::Builder::new()
            .prefix("nupkg-sync-")
            .tempdir()
            .map_err(|e| SyncError::io(std::env::temp_dir(), e))?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs.unwrap_or(0))
            .thread_name(|i| format!("nupkg-sync-{i}"))
            .build()
            .map_err(|e| SyncError::ConfigError(format!("failed to start worker pool: {e}")))?;

        let mut builder = Resolver::builder()
            .cache_roots(self.cache_roots)
            .destination(&self.destination)
            .scratch_root(scratch.path())
            .filter(self.filter.clone())
            .dry_run(self.dry_run);
        if let Some(extractor) = self.extractor {
            builder = builder.boxed_extractor(extractor);
        }
        let resolver = builder.build()?;
        resolver.prepare_destination()?;

        if let Err(e) = pool.install(|| resolver.resolve_all(&manifests)) {
            error!("Resolution failed, skipping garbage collection");
            return Err(e);
        }
        let resolve = resolver.summary();
        info!(
            visited = resolve.visited,
            copied = resolve.copied,
            already_present = resolve.already_present,
            not_found = resolve.not_found,
            "Resolution finished"
        );

        let destination = gc::prune_destination(&self.destination, resolver.visited(), self.dry_run)?;
        info!(
            removed = destination.removed,
            retained = destination.retained,
            freed = %format_size(destination.bytes_freed),
            "Destination pruned"
        );

        let mut cache = PruneStats::default();
        if self.skip_cache_gc {
            debug!("Skipping cache pruning");
        } else {
            for root in self.cache_roots {
                let stats =
                    pool.install(|| gc::prune_cache_root(root, &self.filter, self.dry_run))?;
                info!(
                    root = %root.display(),
                    removed = stats.removed,
                    freed = %format_size(stats.bytes_freed),
                    "Cache pruned"
                );
                cache += stats;
            }
        }

        let scratch_path = scratch.path().to_path_buf();
        scratch
            .close()
            .map_err(|e| SyncError::io(scratch_path, e))?;

        Ok(SyncReport {
            manifests: manifests.len(),
            resolve,
            destination,
            cache,
        })
    }
}

/// Every file under `source_dir` with the given extension, outside
/// `exclude`, in path order.
pub fn discover_manifests(
    source_dir: &Path,
    extension: &str,
    exclude: &Path,
) -> Result<Vec<PathBuf>> {
    let mut manifests = Vec::new();

    let walker = WalkDir::new(source_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.path() != exclude);

    for entry in walker {
        let entry = entry.map_err(|e| SyncError::walk(source_dir, e))?;
        let matches = entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches {
            manifests.push(entry.into_path());
        }
    }

    Ok(manifests)
}
