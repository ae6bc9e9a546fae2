//! Error types for nupkg-sync.
//!
//! This module defines all error types used throughout nupkg-sync, using
//! a combination of `thiserror` for ergonomic error definitions and `miette`
//! for rich diagnostic output.
//!
//! # Error Handling Strategy
//!
//! - All errors derive from [`SyncError`]
//! - Each variant includes helpful error messages and diagnostic codes
//! - Conditions that only end one dependency branch (cache misses, missing
//!   secondary caches, unparseable destination files) are logged, not raised
//! - Failures of sibling branches are gathered into
//!   [`SyncError::BranchFailures`] instead of cancelling each other
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use nupkg_sync::error::{Result, SyncError};
//!
//! fn check_source(path: &Path) -> Result<()> {
//!     if !path.is_dir() {
//!         return Err(SyncError::SourceDirNotFound(path.to_path_buf()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

/// Error types that can occur in nupkg-sync operations
#[derive(Error, Debug, Diagnostic)]
pub enum SyncError {
    /// The directory to scan for project manifests does not exist.
    #[error("Source directory '{0}' does not exist")]
    #[diagnostic(
        code(nupkg_sync::config::source_not_found),
        help("Pass an existing directory containing project files, or run from inside one.")
    )]
    SourceDirNotFound(
        /// The directory that was requested
        PathBuf,
    ),

    /// File system I/O error.
    ///
    /// Common causes: permission denied, disk full, or a file held open by
    /// another process while copying or deleting. The owning dependency branch
    /// is aborted; other branches carry on.
    #[error("I/O error accessing '{path}'")]
    #[diagnostic(code(nupkg_sync::io_error))]
    IoError {
        /// The path that caused the I/O error
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A manifest or package descriptor is not well-formed XML.
    #[error("Failed to parse '{path}': {message}")]
    #[diagnostic(
        code(nupkg_sync::manifest::parse_error),
        help("Check that the file is a valid project file or .nuspec document.")
    )]
    ManifestParse {
        /// The manifest or descriptor being read
        path: PathBuf,
        /// Description from the XML reader
        message: String,
    },

    /// An archive selected for extraction does not follow the
    /// `name.version.nupkg` naming scheme, so its entries cannot be located.
    #[error("Archive name '{0}' is not of the form <name>.<version>.nupkg")]
    #[diagnostic(code(nupkg_sync::archive::malformed_name))]
    MalformedArchiveName(
        /// The offending archive path
        PathBuf,
    ),

    /// The extraction tool ran but reported failure.
    #[error(
        "Extracting '{entry}' from '{archive}' failed ({status}){}",
        tool_output(.stderr)
    )]
    #[diagnostic(
        code(nupkg_sync::extract::failed),
        help("Check that the archive is a valid package and that the extractor can read it.")
    )]
    ExtractionFailed {
        /// The archive being extracted
        archive: PathBuf,
        /// The entry that was requested
        entry: String,
        /// Exit status of the tool
        status: String,
        /// Captured standard error of the tool
        stderr: String,
    },

    /// The extraction tool could not be started.
    #[error("Failed to launch extractor '{program}'")]
    #[diagnostic(
        code(nupkg_sync::extract::launch),
        help("Install 7-Zip (7za) or point --extractor at a compatible program.")
    )]
    ExtractorLaunch {
        /// Program that was invoked
        program: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(nupkg_sync::config::error),
        help("Check the required configuration parameters.")
    )]
    ConfigError(
        /// Description of the configuration error
        String,
    ),

    /// Several independent dependency branches failed.
    ///
    /// A single failing branch is reported as-is; this variant only appears
    /// when siblings fail together so none of the causes is lost.
    #[error("{count} dependency branches failed")]
    #[diagnostic(
        code(nupkg_sync::resolve::branches_failed),
        help("Garbage collection was skipped because the closure is incomplete.")
    )]
    BranchFailures {
        /// Number of failed branches
        count: usize,
        /// The individual failures
        #[related]
        failures: Vec<SyncError>,
    },
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::IoError {
            path: path.into(),
            source,
        }
    }

    /// Map a directory walk failure under `root` to an I/O error.
    pub(crate) fn walk(root: &Path, error: walkdir::Error) -> Self {
        let path = error.path().unwrap_or(root).to_path_buf();
        let source = error
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
        SyncError::io(path, source)
    }
}

// Appended to the extraction failure message when the tool said something
fn tool_output(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Type alias for Results in this crate
pub type Result<T> = std::result::Result<T, SyncError>;

/// Fold the outcomes of independent sibling branches into one result.
///
/// Every branch has already run to completion; this only decides how the
/// failures surface.
pub(crate) fn join_branches(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
    let mut failures: Vec<SyncError> = results.into_iter().filter_map(|r| r.err()).collect();

    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        count => Err(SyncError::BranchFailures { count, failures }),
    }
}
