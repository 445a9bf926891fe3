//! `worksync sync`: run one synchronization step.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use worksync_core::{BuildRequest, PatchDescriptor, StepOutcome};
use worksync_sync::{LocalRunner, StepReport, Synchronizer};

use super::StepSource;

/// `EX_TEMPFAIL`: the build should be rescheduled.
const EXIT_RETRY: u8 = 75;

/// Arguments for `worksync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub step: StepSource,

    /// Revision to pin this build to (full/clobber only).
    #[arg(long)]
    pub revision: Option<String>,

    /// Diff to apply on top of the synchronized tree.
    #[arg(long)]
    pub patch: Option<PathBuf>,

    /// Leading path components `patch` strips.
    #[arg(long, default_value_t = 1)]
    pub patch_level: u32,

    /// Directory workdir and reference paths are relative to.
    #[arg(long, default_value = ".")]
    pub base_dir: PathBuf,

    /// Print the full step report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON report to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl SyncArgs {
    pub fn run(self) -> Result<ExitCode> {
        worksync_poller::init_tracing();

        let config = self.step.load()?;
        let patch = match &self.patch {
            Some(path) => {
                let diff = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read patch {}", path.display()))?;
                Some(PatchDescriptor::new(self.patch_level, diff))
            }
            None => None,
        };
        let request = BuildRequest {
            revision: self.revision.clone(),
            patch,
        };

        let mut runner = LocalRunner::new(&self.base_dir);
        if let Some(hop) = config.remote_hop() {
            runner = runner.with_hop(hop);
        }
        let synchronizer = Synchronizer::new(config);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start tokio runtime")?;
        let report = runtime.block_on(synchronizer.run(&runner, &request));

        if let Some(path) = &self.report {
            report
                .write_to(path)
                .with_context(|| format!("failed to write report {}", path.display()))?;
        }
        if self.json {
            println!("{}", report.to_json().context("failed to serialize report")?);
        } else {
            print_report(&synchronizer, &report);
        }

        Ok(exit_code(&report.outcome))
    }
}

pub fn exit_code(outcome: &StepOutcome) -> ExitCode {
    match outcome {
        StepOutcome::Success { .. } => ExitCode::SUCCESS,
        StepOutcome::Failure { .. } => ExitCode::FAILURE,
        StepOutcome::Retry { .. } => ExitCode::from(EXIT_RETRY),
    }
}

#[derive(Tabled)]
struct OperationRow {
    #[tabled(rename = "operation")]
    operation: String,
    #[tabled(rename = "attempts")]
    attempts: u32,
    #[tabled(rename = "exit")]
    exit: String,
    #[tabled(rename = "result")]
    result: String,
}

fn print_report(synchronizer: &Synchronizer, report: &StepReport) {
    let config = synchronizer.config();
    let target = format!("'{}' ({})", config.workdir().display(), config.mode());
    match &report.outcome {
        StepOutcome::Success { revision } => {
            println!("{} {target} at {}", "✓".green(), revision.bold())
        }
        StepOutcome::Failure { reason } => println!("{} {target} failed: {reason}", "✗".red()),
        StepOutcome::Retry { reason } => {
            println!("{} {target} needs a retry: {reason}", "↻".yellow())
        }
    }

    if report.results.is_empty() {
        return;
    }
    let rows: Vec<OperationRow> = report
        .results
        .iter()
        .map(|r| OperationRow {
            operation: r.operation.clone(),
            attempts: r.attempts,
            exit: r.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".into()),
            result: match &r.reason {
                Some(reason) => reason.clone(),
                None => "ok".into(),
            },
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    if let Some(sha) = &report.patch_sha256 {
        println!("patch sha256 {}", sha.dimmed());
    }
}
