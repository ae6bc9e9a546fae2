//! # nupkg-sync CLI
//!
//! Copies the NuGet package closure of a source tree out of the local package
//! caches, then prunes stale archives and superseded cache versions.
//!
//! ## Commands
//!
//! - **sync**: resolve, copy, prune the destination, prune the caches
//! - **prune**: prune the caches only
//!
//! ## Quick Start
//!
//! ```bash
//! # Copy everything the projects under ./src need into ./src/Nuget
//! nupkg-sync sync ./src
//!
//! # Only follow our own packages, and see what would happen first
//! nupkg-sync --prefix Scar sync ./src --dry-run
//! ```
//!
//! ## Environment Variables
//!
//! - `NUPKG_SYNC_CACHE_ROOTS`: Comma-separated cache roots
//! - `NUGET_PACKAGES`: Default cache root when none is given
//! - `NUPKG_SYNC_PREFIX`: Package name prefix
//! - `NUPKG_SYNC_VERBOSE` / `NUPKG_SYNC_QUIET`: Output verbosity
//! - `NUPKG_SYNC_LOG`: tracing filter directive, overrides the above
//!
//! See individual commands for more environment variables.

use std::io::IsTerminal;

use clap::Parser;
use nupkg_sync::cli::Cli;

fn main() -> miette::Result<()> {
    miette::set_panic_hook();

    if std::io::stderr().is_terminal() {
        miette::set_hook(Box::new(|_| {
            Box::new(
                miette::GraphicalReportHandler::new()
                    .with_theme(miette::GraphicalTheme::unicode_nocolor())
                    .with_context_lines(3),
            )
        }))?;
    } else {
        // Plain output for CI logs
        miette::set_hook(Box::new(|_| {
            Box::new(
                miette::GraphicalReportHandler::new()
                    .with_theme(miette::GraphicalTheme::none())
                    .with_context_lines(0),
            )
        }))?;
    }

    let cli = Cli::parse();
    nupkg_sync::logging::init(cli.global_opts().verbose(), cli.global_opts().quiet());

    nupkg_sync::commands::execute(&cli).map_err(Into::into)
}
