//! Implementation of nupkg-sync subcommands.
//!
//! `mod.rs` is a thin dispatcher and re-export hub; command logic lives in
//! dedicated modules (`sync`, `prune`).

use std::path::{Path, PathBuf};

use crate::cli::{Cli, Commands, normalize_path};
use crate::error::{Result, SyncError};
use crate::materialize::CommandExtractor;

pub mod prune;
pub mod sync;

pub use prune::prune;
pub use sync::{SyncReport, Synchronize, SynchronizeBuilder, discover_manifests};


/// Execute commands based on the parsed CLI arguments.
pub fn execute(cli: &Cli) -> Result<()> {
    execute_with_dir(cli, None)
}

/// Execute commands with an explicit working directory.
///
/// The working directory is the default source directory for `sync`.
pub fn execute_with_dir(cli: &Cli, working_dir: Option<&Path>) -> Result<()> {
    let current_dir = if let Some(dir) = working_dir {
        dir.to_path_buf()
    } else {
        std::env::current_dir().map_err(|source| SyncError::io(PathBuf::from("."), source))?
    };

    let global = cli.global_opts();
    let cache_roots = global.get_cache_roots()?;

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
            let source_dir = normalize_path(
                source_dir
                    .as_ref()
                    .map(|dir| current_dir.join(dir))
                    .unwrap_or_else(|| current_dir.clone()),
            );
            let destination = destination
                .as_ref()
                .map(|dir| normalize_path(current_dir.join(dir)));

            Synchronize::builder()
                .source_dir(&source_dir)
                .destination(destination.as_deref())
                .cache_roots(&cache_roots)
                .prefix(global.prefix())
                .manifest_extension(manifest_extension)
                .jobs(*jobs)
                .dry_run(*dry_run)
                .skip_cache_gc(*skip_cache_gc)
                .extractor(CommandExtractor::seven_zip(extractor.as_str()))
                .build()?
                .run()
                .map(|_| ())
        }
        Commands::Prune { dry_run } => {
            prune(&cache_roots, global.prefix(), *dry_run).map(|_| ())
        }
    }
}
