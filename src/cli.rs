//! Command-line interface definitions for nupkg-sync.
//!
//! This module defines the CLI structure using clap, including all subcommands
//! and their arguments. The main entry point is the [`Cli`] struct.
//!
//! # Example
//!
//! ```no_run
//! use clap::Parser;
//! use nupkg_sync::cli::{Cli, Commands};
//!
//! let cli = Cli::parse();
//!
//! match cli.command() {
//!     Commands::Sync { dry_run, .. } => println!("Syncing (dry run: {dry_run})"),
//!     Commands::Prune { .. } => println!("Pruning caches"),
//! }
//! ```

use std::path::{Component, Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::commands::sync::DEFAULT_MANIFEST_EXTENSION;
use crate::error::{Result, SyncError};

/// Environment variable pointing at the NuGet global-packages folder
pub const NUGET_PACKAGES_ENV: &str = "NUGET_PACKAGES";

/// Main command-line interface for nupkg-sync.
///
/// This struct represents the top-level CLI configuration, containing both
/// global options that apply to all commands and the specific subcommand
/// to execute.
#[derive(Parser)]
#[command(
    name = "nupkg-sync",
    bin_name = "nupkg-sync",
    author,
    version,
    about = "Copy the transitive NuGet package closure of a source tree and prune stale packages",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    global_opts: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

/// Global options that apply to all nupkg-sync commands.
#[derive(Parser)]
pub struct GlobalOpts {
    /// Package cache roots, searched in order (defaults to $NUGET_PACKAGES or
    /// ~/.nuget/packages)
    #[arg(
        long = "cache-root",
        global = true,
        value_delimiter = ',',
        env = "NUPKG_SYNC_CACHE_ROOTS"
    )]
    cache_roots: Vec<PathBuf>,

    /// Only follow and prune packages whose name starts with this prefix
    /// (case-insensitive, empty means all)
    #[arg(long, global = true, default_value = "", env = "NUPKG_SYNC_PREFIX")]
    prefix: String,

    /// Enable verbose output (use multiple times for more verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count, env = "NUPKG_SYNC_VERBOSE")]
    verbose: u8,

    /// Silence all output except for errors
    #[arg(
        short,
        long,
        global = true,
        conflicts_with = "verbose",
        env = "NUPKG_SYNC_QUIET"
    )]
    quiet: bool,
}

impl GlobalOpts {
    /// Create a new builder for constructing `GlobalOpts` programmatically.
    pub fn builder() -> GlobalOptsBuilder {
        GlobalOptsBuilder::default()
    }

    /// Cache roots as given on the command line
    pub fn cache_roots(&self) -> &[PathBuf] {
        &self.cache_roots
    }

    /// Absolute cache roots, falling back to the default NuGet cache
    pub fn get_cache_roots(&self) -> Result<Vec<PathBuf>> {
        if self.cache_roots.is_empty() {
            return Ok(vec![normalize_path(default_cache_root()?)]);
        }
        Ok(self.cache_roots.iter().map(normalize_path).collect())
    }

    /// Get the package name prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Get the verbose level
    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn quiet(&self) -> bool {
        self.quiet
    }
}

/// `$NUGET_PACKAGES`, or `~/.nuget/packages`
pub fn default_cache_root() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(NUGET_PACKAGES_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    home::home_dir()
        .map(|home| home.join(".nuget").join("packages"))
        .ok_or_else(|| {
            SyncError::ConfigError(
                "Could not determine the home directory; pass --cache-root".to_string(),
            )
        })
}

/// Builder for constructing `GlobalOpts` programmatically.
#[derive(Default)]
pub struct GlobalOptsBuilder {
    cache_roots: Vec<PathBuf>,
    prefix: String,
    verbose: u8,
    quiet: bool,
}

impl GlobalOptsBuilder {
    /// Add a cache root.
    pub fn cache_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_roots.push(dir.into());
        self
    }

    /// Set the package name prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the verbosity level (0 = normal, 1+ = verbose).
    pub fn verbose(mut self, level: u8) -> Self {
        self.verbose = level;
        self
    }

    /// Enable or disable quiet mode.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Build the `GlobalOpts` instance with the configured values.
    pub fn build(self) -> GlobalOpts {
        GlobalOpts {
            cache_roots: self.cache_roots,
            prefix: self.prefix,
            verbose: self.verbose,
            quiet: self.quiet,
        }
    }
}

impl Cli {
    /// Get the global options
    pub fn global_opts(&self) -> &GlobalOpts {
        &self.global_opts
    }

    /// Get the command
    pub fn command(&self) -> &Commands {
        &self.command
    }

    /// Create a builder for programmatic construction
    pub fn builder() -> CliBuilder {
        CliBuilder::default()
    }
}

/// Builder for [`Cli`]
#[derive(Debug, Default)]
pub struct CliBuilder {
    cache_roots: Vec<PathBuf>,
    prefix: String,
    verbose: u8,
    quiet: bool,
    command: Option<Commands>,
}

impl CliBuilder {
    /// Add a cache root
    pub fn cache_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_roots.push(dir.into());
        self
    }

    /// Set the package name prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the verbose level
    pub fn verbose(mut self, level: u8) -> Self {
        self.verbose = level;
        self
    }

    /// Enable quiet mode
    pub fn quiet(mut self, enabled: bool) -> Self {
        self.quiet = enabled;
        self
    }

    /// Set the command
    pub fn command(mut self, command: Commands) -> Self {
        self.command = Some(command);
        self
    }

    /// Build the Cli instance
    pub fn build(self) -> Result<Cli> {
        let command = self
            .command
            .ok_or_else(|| SyncError::ConfigError("Command is required".to_string()))?;
        if self.quiet && self.verbose > 0 {
            return Err(SyncError::ConfigError(
                "quiet and verbose are mutually exclusive".to_string(),
            ));
        }

        let mut global_opts = GlobalOpts::builder()
            .prefix(self.prefix)
            .verbose(self.verbose)
            .quiet(self.quiet);
        for root in self.cache_roots {
            global_opts = global_opts.cache_root(root);
        }

        Ok(Cli {
            global_opts: global_opts.build(),
            command,
        })
    }
}

/// Normalize a path to be absolute and clean, without requiring it to exist.
///
/// This function:
/// - Converts relative paths to absolute using the current directory
/// - Removes `.` and `..` components where possible
/// - Does NOT resolve symlinks (preserves user intent)
/// - Does NOT require the path to exist
pub(crate) fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();

    let absolute = if path.is_relative() {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    } else {
        path.to_path_buf()
    };

    let mut components = Vec::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                if let Some(last) = components.last()
                    && !matches!(last, Component::ParentDir | Component::RootDir)
                {
                    components.pop();
                    continue;
                }
                if matches!(components.last(), Some(Component::RootDir)) {
                    continue;
                }
                components.push(component);
            }
            Component::CurDir => continue,
            _ => components.push(component),
        }
    }

    components.into_iter().collect()
}

/// Available nupkg-sync subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Copy the package closure of a source tree and prune what it no longer
    /// needs
    ///
    /// 1. Finds every project file under SOURCE_DIR
    /// 2. Copies each referenced package, and everything its .nuspec depends
    ///    on, from the cache roots into the destination
    /// 3. Removes archives from the destination that were not reached
    /// 4. Keeps only the newest version of each package in every cache root
    ///
    /// Garbage collection is skipped if any package failed to resolve.
    Sync {
        /// Directory to scan for project files (defaults to the current
        /// directory)
        source_dir: Option<PathBuf>,

        /// Directory receiving the archives (defaults to `<SOURCE_DIR>/Nuget`)
        #[arg(long, env = "NUPKG_SYNC_DESTINATION")]
        destination: Option<PathBuf>,

        /// Number of worker threads (defaults to the number of CPUs)
        #[arg(short, long, env = "NUPKG_SYNC_JOBS")]
        jobs: Option<usize>,

        /// Show what would be copied or deleted without touching anything
        #[arg(long, env = "NUPKG_SYNC_DRY_RUN")]
        dry_run: bool,

        /// Archive extraction program, invoked 7-Zip style
        #[arg(long, default_value = "7za", env = "NUPKG_SYNC_EXTRACTOR")]
        extractor: String,

        /// Extension of the project files to scan
        #[arg(long, default_value = DEFAULT_MANIFEST_EXTENSION, env = "NUPKG_SYNC_MANIFEST_EXTENSION")]
        manifest_extension: String,

        /// Leave the cache roots untouched
        #[arg(long, env = "NUPKG_SYNC_SKIP_CACHE_GC")]
        skip_cache_gc: bool,
    },

    /// Keep only the newest version of each package in every cache root
    Prune {
        /// Show what would be deleted without actually deleting
        #[arg(long, env = "NUPKG_SYNC_DRY_RUN")]
        dry_run: bool,
    },
}

impl Commands {
    /// A `sync` of `source_dir` with default options
    pub fn sync(source_dir: impl Into<PathBuf>) -> Self {
        Commands::Sync {
            source_dir: Some(source_dir.into()),
            destination: None,
            jobs: None,
            dry_run: false,
            extractor: "7za".to_string(),
            manifest_extension: DEFAULT_MANIFEST_EXTENSION.to_string(),
            skip_cache_gc: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["nupkg-sync", "sync"]);
        match cli.command() {
            Commands::Sync {
                source_dir,
                destination,
                jobs,
                dry_run,
                extractor,
                manifest_extension,
                skip_cache_gc,
            } => {
                assert!(source_dir.is_none());
                assert!(destination.is_none());
                assert!(jobs.is_none());
                assert!(!dry_run);
                assert_eq!(extractor, "7za");
                assert_eq!(manifest_extension, "csproj");
                assert!(!skip_cache_gc);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(cli.global_opts().cache_roots().is_empty());
        assert_eq!(cli.global_opts().prefix(), "");
        assert_eq!(cli.global_opts().verbose(), 0);
        assert!(!cli.global_opts().quiet());
    }

    #[test]
    fn test_sync_options() {
        let cli = Cli::parse_from([
            "nupkg-sync",
            "sync",
            "src",
            "--destination",
            "out",
            "-j",
            "4",
            "--dry-run",
            "--extractor",
            "7z",
            "--skip-cache-gc",
        ]);
        match cli.command() {
            Commands::Sync {
                source_dir,
                destination,
                jobs,
                dry_run,
                extractor,
                skip_cache_gc,
                ..
            } => {
                assert_eq!(source_dir.as_deref(), Some(Path::new("src")));
                assert_eq!(destination.as_deref(), Some(Path::new("out")));
                assert_eq!(*jobs, Some(4));
                assert!(dry_run);
                assert_eq!(extractor, "7z");
                assert!(skip_cache_gc);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cache_roots_repeat_and_split() {
        let cli = Cli::parse_from([
            "nupkg-sync",
            "--cache-root",
            "a,b",
            "--cache-root",
            "c",
            "prune",
        ]);
        assert_eq!(
            cli.global_opts().cache_roots(),
            &[PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
        let roots = cli.global_opts().get_cache_roots().unwrap();
        assert!(roots.iter().all(|root| root.is_absolute()));
        assert!(roots[2].ends_with("c"));
    }

    #[test]
    fn test_global_flag_positioning() {
        let cli = Cli::parse_from(["nupkg-sync", "prune", "--verbose", "--prefix", "Scar"]);
        assert_eq!(cli.global_opts().verbose(), 1);
        assert_eq!(cli.global_opts().prefix(), "Scar");
        assert!(matches!(cli.command(), Commands::Prune { dry_run: false }));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["nupkg-sync", "-q", "-v", "prune"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_builder() {
        let cli = Cli::builder()
            .cache_root("/cache/one")
            .cache_root("/cache/two")
            .prefix("Scar")
            .verbose(2)
            .command(Commands::sync("/src"))
            .build()
            .expect("Failed to build CLI");

        assert_eq!(cli.global_opts().cache_roots().len(), 2);
        assert_eq!(cli.global_opts().prefix(), "Scar");
        assert_eq!(cli.global_opts().verbose(), 2);
        assert!(matches!(cli.command(), Commands::Sync { .. }));

        assert!(Cli::builder().build().is_err());
        assert!(
            Cli::builder()
                .quiet(true)
                .verbose(1)
                .command(Commands::Prune { dry_run: false })
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_normalize_path() {
        let normalized = normalize_path("./target/./debug");
        assert!(normalized.is_absolute());
        assert!(!normalized.to_string_lossy().contains("/./"));

        let normalized = normalize_path("target/../other/target");
        assert!(normalized.is_absolute());
        assert!(normalized.ends_with("other/target"));
        assert!(!normalized.to_string_lossy().contains(".."));

        let abs_path = if cfg!(windows) {
            PathBuf::from("C:\\Users\\test")
        } else {
            PathBuf::from("/home/test")
        };
        assert_eq!(normalize_path(&abs_path), abs_path);

        let normalized = normalize_path("./a/b/../c/./d/../e");
        assert!(normalized.is_absolute());
        assert!(normalized.ends_with("a/c/e"));
    }
}
