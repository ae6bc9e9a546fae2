//! # nupkg-sync
//!
//! Copies the transitive NuGet package closure of a source tree from local
//! package caches into a destination folder, then garbage-collects both the
//! destination and the caches.
//!
//! ## Overview
//!
//! Project files (`*.csproj`) declare their direct package references. Each
//! referenced archive is looked up in the cache roots and copied into the
//! destination, and its own `.nuspec` descriptor is extracted to discover the
//! next layer of dependencies. Once the closure is complete:
//!
//! - archives in the destination that were not reached are deleted
//! - every package in each cache root is trimmed to its newest version
//!
//! ## Key Features
//!
//! - **Parallel resolution**: manifests and dependency fan-out run on a
//!   bounded rayon pool
//! - **Exactly-once materialization**: a shared visited set makes cycles and
//!   diamonds safe
//! - **Scoped extraction**: scratch directories are always removed
//! - **Natural version ordering**: `2.10.0` is newer than `2.9.0`
//! - **Dry run**: every destructive step can be previewed
//!
//! ## Architecture
//!
//! - [`cli`]: Command-line interface definitions using clap
//! - [`commands`]: The `sync` and `prune` workflows
//! - [`error`]: Error types and handling with thiserror + miette
//! - [`package`]: Package identities, versions and the name filter
//! - [`manifest`]: Dependency declarations from project files and descriptors
//! - [`materialize`]: Extracting archive entries into scratch directories
//! - [`resolver`]: The dependency closure resolver
//! - [`gc`]: Destination and cache garbage collection
//! - [`logging`]: tracing subscriber setup
//!
//! ## Library Usage
//!
//! ```no_run
//! use nupkg_sync::cli::{Cli, Commands};
//! use nupkg_sync::commands;
//!
//! let cli = Cli::builder()
//!     .cache_root("/home/me/.nuget/packages")
//!     .prefix("Scar")
//!     .command(Commands::sync("."))
//!     .build()?;
//!
//! commands::execute(&cli)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! The crate uses a combination of:
//! - `thiserror` for strongly-typed errors
//! - `miette` for rich diagnostic output in CLI
//!
//! All public functions return `Result` types with descriptive error variants.

pub mod cli;
pub mod commands;
pub mod error;
pub mod gc;
pub mod logging;
pub mod manifest;
pub mod materialize;
pub mod package;
pub mod resolver;
