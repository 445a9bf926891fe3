//! The source-sync step: probe, plan, execute, report.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use worksync_core::{BuildRequest, StepConfig, StepOutcome};

use crate::backend::{backend_for, VcsBackend};
use crate::error::SyncError;
use crate::executor::{Executor, Halted, OperationResult};
use crate::patch;
use crate::plan::{self, Operation, SyncPlan};
use crate::probe::{self, WorkdirObservation};
use crate::runner::CommandRunner;

/// Everything one run produced, in the order it happened.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub outcome: StepOutcome,
    /// Absent when the run halted before the workdir was observed.
    pub observation: Option<WorkdirObservation>,
    pub plan: Option<SyncPlan>,
    pub results: Vec<OperationResult>,
    pub patch_sha256: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepReport {
    /// Tries recorded for every occurrence of the named operation.
    pub fn attempts_of(&self, operation: &str) -> u32 {
        self.results
            .iter()
            .filter(|r| r.operation == operation)
            .map(|r| r.attempts)
            .sum()
    }

    pub fn to_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<(), SyncError> {
        let json = self.to_json()?;
        let report_err = |source| SyncError::Report {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(report_err)?;
        }
        std::fs::write(path, json).map_err(report_err)
    }
}

/// A configured synchronization step, reusable across builds.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    config: StepConfig,
    backend: &'static dyn VcsBackend,
}

impl Synchronizer {
    pub fn new(config: StepConfig) -> Self {
        let backend = backend_for(config.backend());
        Self { config, backend }
    }

    /// Load the named step from `<home>/.worksync/steps/<name>.yaml`.
    pub fn load_at(home: &Path, name: &str) -> Result<Self, SyncError> {
        Ok(Self::new(worksync_core::config::load_step_at(home, name)?))
    }

    pub fn from_file(path: &Path) -> Result<Self, SyncError> {
        Ok(Self::new(worksync_core::config::load_step_file(path)?))
    }

    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    pub fn backend(&self) -> &'static dyn VcsBackend {
        self.backend
    }

    /// Bring the working directory to the requested state.
    ///
    /// Never returns an error: every failure is folded into the report's
    /// outcome. Runs are not re-entrant on one workdir; callers serialize.
    pub async fn run(&self, runner: &dyn CommandRunner, request: &BuildRequest) -> StepReport {
        let started_at = Utc::now();
        tracing::info!(
            repo = self.config.repo_url(),
            mode = %self.config.mode(),
            workdir = %self.config.workdir().display(),
            revision = plan::effective_revision(&self.config, request),
            patched = request.patch.is_some(),
            "starting source sync"
        );

        let mut exec = Executor::new(runner, &self.config, self.backend, request);
        let (observation, plan, outcome) = match Self::prepare(&mut exec, request).await {
            Ok((observation, plan)) => {
                tracing::debug!(actions = ?plan.actions(), "planned");
                let outcome = exec.run_plan(&plan).await;
                (Some(observation), Some(plan), outcome)
            }
            Err(Halted(outcome)) => (None, None, outcome),
        };

        match &outcome {
            StepOutcome::Success { revision } => tracing::info!(%revision, "source sync succeeded"),
            StepOutcome::Retry { reason } => tracing::warn!(%reason, "source sync needs a retry"),
            StepOutcome::Failure { reason } => tracing::error!(%reason, "source sync failed"),
        }

        StepReport {
            outcome,
            observation,
            plan,
            results: exec.into_results(),
            patch_sha256: request.patch.as_ref().map(patch::digest),
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn prepare(
        exec: &mut Executor<'_>,
        request: &BuildRequest,
    ) -> Result<(WorkdirObservation, SyncPlan), Halted> {
        exec.execute(Operation::ProbeVersion).await?;
        let observation = probe::observe(exec).await?;
        let plan = plan::plan(exec.config(), &observation, request);
        Ok((observation, plan))
    }
}
