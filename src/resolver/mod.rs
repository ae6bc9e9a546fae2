//! Dependency closure resolution.
//!
//! The resolver seeds from project manifests and follows every dependency
//! declared in each resolved package's own `.nuspec`, copying archives from
//! the cache roots into the destination as it goes.
//!
//! # Concurrency
//!
//! Manifests are processed in parallel, and so are the dependencies found in
//! each descriptor. Everything runs on the current rayon pool, so the pool
//! size bounds how many extractor processes can run at once. The shared
//! [`VisitedSet`] is the only synchronization point: its combined
//! check-and-insert guarantees each package is materialized at most once,
//! which also makes cycles and diamonds safe.
//!
//! [`Resolver::resolve_all`] returns only after every nested branch has
//! finished, so its caller can treat the return as a barrier before pruning.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//!
//! use nupkg_sync::package::PackageFilter;
//! use nupkg_sync::resolver::Resolver;
//!
//! let resolver = Resolver::builder()
//!     .cache_root("/home/me/.nuget/packages")
//!     .destination("Nuget")
//!     .scratch_root(std::env::temp_dir())
//!     .filter(PackageFilter::new("Scar"))
//!     .build()?;
//!
//! resolver.resolve_all(&[PathBuf::from("App/App.csproj")])?;
//! println!("{} packages in closure", resolver.visited().len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, SyncError, join_branches};
use crate::manifest::{ManifestKind, extract_dependencies};
use crate::materialize::{CommandExtractor, EntryExtractor, with_declared_entries};
use crate::package::{PackageFilter, PackageIdentity, PackageVersion};

mod visited;

pub use visited::VisitedSet;

/// Resolves the package closure of a set of manifests
pub struct Resolver {
    cache_roots: Vec<PathBuf>,
    destination: PathBuf,
    scratch_root: PathBuf,
    extractor: Box<dyn EntryExtractor>,
    filter: PackageFilter,
    dry_run: bool,
    visited: VisitedSet,
    existing: OnceLock<HashMap<String, PathBuf>>,
    counters: Counters,
}

#[derive(Debug, Default)]
struct Counters {
    copied: AtomicUsize,
    already_present: AtomicUsize,
    duplicates: AtomicUsize,
    not_found: AtomicUsize,
    extracted: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Counts of package-level events during resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    /// Archives copied from a cache root (or that would be, in dry-run mode)
    pub copied: usize,
    /// Archives that were already in the destination
    pub already_present: usize,
    /// References to a package that had already been claimed
    pub duplicates: usize,
    /// Packages missing from every cache root
    pub not_found: usize,
    /// Archives whose descriptor was extracted
    pub extracted: usize,
    /// Unique packages reached
    pub visited: usize,
}

impl Resolver {
    /// Creates a new builder for [`Resolver`]
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::default()
    }

    pub fn cache_roots(&self) -> &[PathBuf] {
        &self.cache_roots
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Packages reached so far
    pub fn visited(&self) -> &VisitedSet {
        &self.visited
    }

    pub fn summary(&self) -> ResolveSummary {
        ResolveSummary {
            copied: self.counters.copied.load(Ordering::Relaxed),
            already_present: self.counters.already_present.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            not_found: self.counters.not_found.load(Ordering::Relaxed),
            extracted: self.counters.extracted.load(Ordering::Relaxed),
            visited: self.visited.len(),
        }
    }

    /// Ensure the destination exists before the first copy
    pub fn prepare_destination(&self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        fs::create_dir_all(&self.destination).map_err(|e| SyncError::io(&self.destination, e))
    }

    /// Resolve every manifest concurrently and wait for all branches.
    ///
    /// A failing branch does not stop its siblings; failures are collected
    /// and returned once everything has settled.
    pub fn resolve_all(&self, manifests: &[PathBuf]) -> Result<()> {
        let results: Vec<Result<()>> = manifests
            .par_iter()
            .map(|manifest| self.resolve_manifest(manifest))
            .collect();

        join_branches(results)
    }

    /// Clone every package a project manifest declares, and their
    /// dependencies.
    pub fn resolve_manifest(&self, manifest: &Path) -> Result<()> {
        let dependencies = extract_dependencies(manifest, ManifestKind::Project, &self.filter)?;
        debug!(
            manifest = %manifest.display(),
            count = dependencies.len(),
            "Resolving manifest"
        );

        self.clone_all(&dependencies, None)
    }

    /// Materialize `identity` into the destination and recurse into the
    /// dependencies declared by its descriptor.
    ///
    /// 1. Claim the identity; a package that was already claimed is skipped
    /// 2. If the archive is already in the destination, skip the copy
    /// 3. Otherwise look it up in the cache roots; a miss ends this branch
    ///    without failing it
    /// 4. Copy the cached archive into the destination
    /// 5. Extract its descriptor and clone each dependency it declares
    ///
    /// Packages already present are still walked in step 5, otherwise their
    /// dependencies would look stale to the destination pruning pass.
    ///
    /// Ids match without regard to case in both the destination and the
    /// cache roots. A copy is named with the cached archive's spelling unless
    /// that spelling is all lower case.
    pub fn clone_package(&self, identity: &PackageIdentity) -> Result<()> {
        if !self.visited.insert(identity) {
            bump(&self.counters.duplicates);
            info!(package = %identity, "Package is already processed");
            return Ok(());
        }

        let archive = if let Some(existing) = self.existing_archives().get(identity.key()) {
            bump(&self.counters.already_present);
            info!(
                package = %identity,
                destination = %self.destination.display(),
                "Package already exists in destination"
            );
            existing.clone()
        } else {
            let Some(cached) = self.find_in_cache(identity) else {
                bump(&self.counters.not_found);
                warn!(package = %identity, "Package does not exist in any cache root");
                return Ok(());
            };

            bump(&self.counters.copied);
            if self.dry_run {
                info!(package = %identity, source = %cached.display(), "Would copy from cache");
                cached
            } else {
                let spelled = PackageIdentity::from_archive_path(&cached)
                    .map_or_else(|| identity.clone(), |found| found.respelled(identity));
                let destination_file = self.destination.join(spelled.archive_file_name());
                self.copy_into_destination(&cached, &destination_file)?;
                info!(
                    package = %identity,
                    destination = %self.destination.display(),
                    "Copied from cache"
                );
                destination_file
            }
        };

        self.walk_descriptor(identity, &archive)
    }

    fn clone_all(
        &self,
        dependencies: &[PackageIdentity],
        dependent: Option<&PackageIdentity>,
    ) -> Result<()> {
        let results: Vec<Result<()>> = dependencies
            .par_iter()
            .map(|dependency| {
                match dependent {
                    Some(parent) => {
                        trace!(package = %dependency, dependent = %parent, "Trying to clone dependency")
                    }
                    None => trace!(package = %dependency, "Trying to clone"),
                }
                self.clone_package(dependency)
            })
            .collect();

        join_branches(results)
    }

    fn walk_descriptor(&self, identity: &PackageIdentity, archive: &Path) -> Result<()> {
        bump(&self.counters.extracted);

        with_declared_entries(
            archive,
            identity,
            &self.scratch_root,
            self.extractor.as_ref(),
            |entries| {
                let dependencies = extract_dependencies(
                    &entries.descriptor,
                    ManifestKind::Descriptor,
                    &self.filter,
                )?;
                debug!(
                    package = %identity,
                    count = dependencies.len(),
                    "Read package descriptor"
                );
                self.clone_all(&dependencies, Some(identity))
            },
        )
    }

    fn find_in_cache(&self, identity: &PackageIdentity) -> Option<PathBuf> {
        self.cache_roots.iter().find_map(|root| {
            identity
                .cache_candidates(root)
                .into_iter()
                .find(|candidate| candidate.is_file())
                .or_else(|| scan_cache_root(root, identity))
        })
    }

    // Listed once, on first use. Archives copied later are already claimed
    // in the visited set, so they are never looked up here.
    fn existing_archives(&self) -> &HashMap<String, PathBuf> {
        self.existing.get_or_init(|| index_archives(&self.destination))
    }

    // Copy through a temporary file so an interrupted copy never looks like a
    // materialized archive.
    fn copy_into_destination(&self, source: &Path, target: &Path) -> Result<()> {
        let mut input = File::open(source).map_err(|e| SyncError::io(source, e))?;
        let mut staged = tempfile::NamedTempFile::new_in(&self.destination)
            .map_err(|e| SyncError::io(&self.destination, e))?;
        std::io::copy(&mut input, staged.as_file_mut()).map_err(|e| SyncError::io(target, e))?;
        staged
            .persist(target)
            .map_err(|e| SyncError::io(target, e.error))?;
        Ok(())
    }
}

/// Builder for [`Resolver`]
#[derive(Default)]
pub struct ResolverBuilder {
    cache_roots: Vec<PathBuf>,
    destination: Option<PathBuf>,
    scratch_root: Option<PathBuf>,
    extractor: Option<Box<dyn EntryExtractor>>,
    filter: PackageFilter,
    dry_run: bool,
}

impl ResolverBuilder {
    /// Add a cache root; roots are searched in the order they were added
    pub fn cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_roots.push(root.into());
        self
    }

    /// Replace the list of cache roots
    pub fn cache_roots(mut self, roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.cache_roots = roots.into_iter().map(Into::into).collect();
        self
    }

    /// Directory receiving the archives
    pub fn destination(mut self, dir: impl Into<PathBuf>) -> Self {
        self.destination = Some(dir.into());
        self
    }

    /// Directory under which per-archive scratch directories are created
    pub fn scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(dir.into());
        self
    }

    /// Entry extractor (defaults to `7za`)
    pub fn extractor(mut self, extractor: impl EntryExtractor + 'static) -> Self {
        self.extractor = Some(Box::new(extractor));
        self
    }

    /// Boxed entry extractor
    pub fn boxed_extractor(mut self, extractor: Box<dyn EntryExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Only follow packages accepted by `filter`
    pub fn filter(mut self, filter: PackageFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Report copies instead of performing them
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Build the [`Resolver`]
    pub fn build(self) -> Result<Resolver> {
        Ok(Resolver {
            cache_roots: self.cache_roots,
            destination: self
                .destination
                .ok_or_else(|| SyncError::ConfigError("destination is required".to_string()))?,
            scratch_root: self
                .scratch_root
                .ok_or_else(|| SyncError::ConfigError("scratch_root is required".to_string()))?,
            extractor: self
                .extractor
                .unwrap_or_else(|| Box::new(CommandExtractor::default())),
            filter: self.filter,
            dry_run: self.dry_run,
            visited: VisitedSet::new(),
            existing: OnceLock::new(),
            counters: Counters::default(),
        })
    }
}

/// Case-insensitive `<name>/<version>/<name>.<version>.nupkg` lookup, for
/// roots whose casing matches neither the declared id nor the lower-cased
/// global-packages layout.
fn scan_cache_root(root: &Path, identity: &PackageIdentity) -> Option<PathBuf> {
    let version = identity.version().to_string();
    let package_dir = find_child(root, |name| name.eq_ignore_ascii_case(identity.name()))?;
    let version_dir = find_child(&package_dir, |name| {
        PackageVersion::parse(name).is_some_and(|v| v.to_string().eq_ignore_ascii_case(&version))
    })?;
    let archive = find_child(&version_dir, |name| {
        PackageIdentity::from_archive_name(name).is_some_and(|found| found == *identity)
    })?;

    archive.is_file().then_some(archive)
}

fn find_child(dir: &Path, matches: impl Fn(&str) -> bool) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_name().to_str().is_some_and(&matches))
        .map(|entry| entry.path())
}

/// Archives directly inside `dir`, keyed by [`PackageIdentity::key`]
fn index_archives(dir: &Path) -> HashMap<String, PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Cannot list destination, treating it as empty");
            return HashMap::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let identity = PackageIdentity::from_archive_path(&path)?;
            Some((identity.key().to_string(), path))
        })
        .collect()
}
