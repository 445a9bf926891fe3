//! worksync: keep a build working copy in sync with its repository.
//!
//! # Usage
//!
//! ```text
//! worksync sync <step> | --file <path> [--revision R] [--patch FILE [--patch-level N]]
//!                                       [--base-dir DIR] [--json] [--report PATH]
//! worksync plan <step> | --file <path> [--metadata] [--patched] [--reference-metadata]
//!                                       [--with-patch] [--revision R]
//! worksync poll <mirror> | --file <path> [--once] [--output PATH]
//! ```
//!
//! `sync` exits 0 on success, 1 on failure and 75 when the build should be
//! retried later.

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{plan::PlanArgs, poll::PollArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "worksync",
    version,
    about = "Synchronize build working copies and poll package mirrors",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring a step's working directory to the requested revision.
    Sync(SyncArgs),

    /// Show the operations a sync would run for a given workdir state.
    Plan(PlanArgs),

    /// Poll an xbps mirror for newly built packages.
    Poll(PollArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Plan(args) => args.run().map(|()| ExitCode::SUCCESS),
        Commands::Poll(args) => args.run().map(|()| ExitCode::SUCCESS),
    }
}
