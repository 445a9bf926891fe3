//! `worksync plan`: print the plan for a hypothetical workdir state.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use worksync_core::{BuildRequest, PatchDescriptor};
use worksync_sync::{plan, Operation, WorkdirObservation};

use super::StepSource;

/// Arguments for `worksync plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub step: StepSource,

    /// The workdir holds backend metadata.
    #[arg(long)]
    pub metadata: bool,

    /// The patched marker is present.
    #[arg(long)]
    pub patched: bool,

    /// The reference checkout holds backend metadata.
    #[arg(long)]
    pub reference_metadata: bool,

    /// The build carries a patch.
    #[arg(long)]
    pub with_patch: bool,

    /// Revision requested by the build.
    #[arg(long)]
    pub revision: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct PlanJson<'a> {
    mode: String,
    observation: WorkdirObservation,
    operations: &'a [Operation],
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        let config = self.step.load()?;
        let observation = WorkdirObservation {
            has_metadata: self.metadata,
            is_patched: self.patched,
            reference_has_metadata: self.reference_metadata,
        };
        let request = BuildRequest {
            revision: self.revision.clone(),
            patch: self
                .with_patch
                .then(|| PatchDescriptor::new(1, String::new())),
        };

        let plan = plan::plan(&config, &observation, &request);
        let operations = plan.operations();

        if self.json {
            let json = PlanJson {
                mode: config.mode().to_string(),
                observation,
                operations: &operations,
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
            return Ok(());
        }

        println!(
            "{} plan for {} ({})",
            "→".cyan(),
            config.repo_url().bold(),
            config.mode()
        );
        for (i, op) in operations.iter().enumerate() {
            let marker = if i < plan.prelude().len() {
                "observe".dimmed()
            } else {
                "run".normal()
            };
            println!("  {:>2}. {op} [{marker}]", i + 1);
        }
        Ok(())
    }
}
