//! Plan executor.
//!
//! Issues one runner call per operation, strictly in order, and interprets
//! the result. Retryable operations go through the [`RetryController`] with
//! their cleanup prelude re-run before every re-attempt. The first failure
//! that cannot be retried halts the run.

use std::path::{Path, PathBuf};

use serde::Serialize;
use worksync_core::{BuildRequest, StepConfig, StepOutcome};

use crate::backend::VcsBackend;
use crate::error::RunnerError;
use crate::patch;
use crate::plan::{effective_revision, removes_while_observing, Operation, SyncPlan};
use crate::retry::{FailureClass, OpFailure, RetryController};
use crate::revision;
use crate::runner::{CommandOutput, CommandRunner, ShellCommand, BULK_TIMEOUT};

/// Record of one executed operation, kept for the step report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub operation: String,
    /// Number of tries, including the successful or final one.
    pub attempts: u32,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub failure: Option<FailureClass>,
    pub reason: Option<String>,
}

/// The run stopped early with this outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Halted(pub StepOutcome);

impl From<OpFailure> for Halted {
    fn from(failure: OpFailure) -> Self {
        Halted(failure.into_outcome())
    }
}

pub struct Executor<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a StepConfig,
    backend: &'a dyn VcsBackend,
    request: &'a BuildRequest,
    retry: RetryController,
    results: Vec<OperationResult>,
    revision: Option<String>,
}

impl<'a> Executor<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        config: &'a StepConfig,
        backend: &'a dyn VcsBackend,
        request: &'a BuildRequest,
    ) -> Self {
        Self {
            runner,
            config,
            backend,
            request,
            retry: RetryController::new(config.retry()),
            results: Vec::new(),
            revision: None,
        }
    }

    pub fn config(&self) -> &'a StepConfig {
        self.config
    }

    pub fn backend(&self) -> &'a dyn VcsBackend {
        self.backend
    }

    pub fn results(&self) -> &[OperationResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<OperationResult> {
        self.results
    }

    /// Stat `path`. Only connection loss halts, and then as a retry.
    pub async fn probe(&mut self, what: &str, path: &Path) -> Result<bool, Halted> {
        match self.runner.stat(path).await {
            Ok(exists) => {
                tracing::debug!(what, path = %path.display(), exists, "probe");
                Ok(exists)
            }
            Err(err) => {
                let failure = OpFailure::from_error(what, &err);
                self.record(what, 1, None, Some(&failure));
                tracing::warn!(what, error = %err, "probe failed");
                Err(failure.into())
            }
        }
    }

    /// Run every action of `plan` and resolve the final outcome.
    pub async fn run_plan(&mut self, plan: &SyncPlan) -> StepOutcome {
        for op in plan.actions() {
            if let Err(Halted(outcome)) = self.execute(*op).await {
                return outcome;
            }
        }
        match self.revision.take() {
            Some(revision) => StepOutcome::Success { revision },
            None => StepOutcome::Failure {
                reason: "plan finished without querying the revision".to_string(),
            },
        }
    }

    /// Run `op`, re-attempting transient failures within the retry budget.
    pub async fn execute(&mut self, op: Operation) -> Result<(), Halted> {
        let retryable = op.is_retryable();
        let mut attempt = 1;
        loop {
            if attempt > 1 {
                for prelude in op.retry_prelude() {
                    self.execute_once(*prelude, 1).await?;
                }
            }
            match self.attempt(op).await {
                Ok(output) => return self.finish(op, attempt, output),
                Err((failure, output)) => {
                    if self.retry.should_retry(&failure, attempt, retryable) {
                        tracing::warn!(
                            operation = %op,
                            attempt,
                            max_attempts = self.retry.max_attempts(retryable),
                            reason = %failure.reason,
                            "operation failed, retrying"
                        );
                        self.retry.wait().await;
                        attempt += 1;
                        continue;
                    }
                    self.record(op.name(), attempt, output.as_ref(), Some(&failure));
                    tracing::error!(operation = %op, attempt, reason = %failure.reason, "operation failed");
                    return Err(failure.into());
                }
            }
        }
    }

    async fn execute_once(&mut self, op: Operation, attempt: u32) -> Result<(), Halted> {
        match self.attempt(op).await {
            Ok(output) => self.finish(op, attempt, output),
            Err((failure, output)) => {
                self.record(op.name(), attempt, output.as_ref(), Some(&failure));
                tracing::error!(operation = %op, reason = %failure.reason, "operation failed");
                Err(failure.into())
            }
        }
    }

    fn finish(&mut self, op: Operation, attempt: u32, output: CommandOutput) -> Result<(), Halted> {
        if op == Operation::QueryRevision {
            match revision::resolve(self.backend, &output) {
                Ok(rev) => self.revision = Some(rev),
                Err(failure) => {
                    self.record(op.name(), attempt, Some(&output), Some(&failure));
                    return Err(failure.into());
                }
            }
        }
        tracing::info!(operation = %op, attempt, "operation succeeded");
        self.record(op.name(), attempt, Some(&output), None);
        Ok(())
    }

    /// One try: issue the runner call and classify the result.
    async fn attempt(
        &self,
        op: Operation,
    ) -> Result<CommandOutput, (OpFailure, Option<CommandOutput>)> {
        match self.dispatch(op).await {
            Err(err) => Err((OpFailure::from_error(op.name(), &err), None)),
            Ok(output) if !output.success() => Err((
                OpFailure::from_exit(op.name(), &output, op.is_retryable()),
                Some(output),
            )),
            Ok(output) => Ok(output),
        }
    }

    async fn dispatch(&self, op: Operation) -> Result<CommandOutput, RunnerError> {
        let workdir = self.config.workdir();
        let reference = self.config.reference_dir();
        let runner = self.runner;
        let backend = self.backend;

        match op {
            Operation::ProbeVersion => {
                runner
                    .run(&ShellCommand::new(workdir, backend.version_argv()))
                    .await
            }
            Operation::ProbeMarker { .. } => {
                runner.stat(&crate::probe::marker_path(workdir)).await?;
                Ok(CommandOutput::default())
            }
            Operation::RemoveWorkdir => {
                let timeout = removes_while_observing(self.config.mode()).then_some(BULK_TIMEOUT);
                runner.rmdir(workdir, timeout).await?;
                Ok(CommandOutput::default())
            }
            Operation::RemoveReference => {
                runner.rmdir(reference, Some(BULK_TIMEOUT)).await?;
                Ok(CommandOutput::default())
            }
            Operation::TransferContext => {
                let revision = effective_revision(self.config, self.request).ok_or(
                    RunnerError::Rejected {
                        op: "transfer context",
                        message: "no revision to pin".to_string(),
                    },
                )?;
                runner
                    .download_file(&self.context_path(), revision.as_bytes())
                    .await?;
                Ok(CommandOutput::default())
            }
            Operation::CloneAtContext => {
                let context = self.context_path();
                let argv = backend.clone_argv(self.config.repo_url(), workdir, Some(&context));
                runner.run(&ShellCommand::new(".", argv)).await
            }
            Operation::CloneWorkdir => {
                let argv = backend.clone_argv(self.config.repo_url(), workdir, None);
                runner.run(&ShellCommand::new(".", argv)).await
            }
            Operation::CloneReference => {
                let argv = backend.clone_argv(self.config.repo_url(), reference, None);
                runner.run(&ShellCommand::new(".", argv)).await
            }
            Operation::PullInPlace => {
                runner
                    .run(&ShellCommand::new(workdir, backend.pull_argv()))
                    .await
            }
            Operation::PullReference => {
                runner
                    .run(&ShellCommand::new(reference, backend.pull_argv()))
                    .await
            }
            Operation::CopyReferenceToWorkdir => {
                runner
                    .copydir(reference, workdir, Some(BULK_TIMEOUT))
                    .await?;
                Ok(CommandOutput::default())
            }
            Operation::TransferDiff
            | Operation::TransferMarker
            | Operation::ApplyPatch
            | Operation::RemoveDiff => {
                let patch = self.request.patch.as_ref().ok_or(RunnerError::Rejected {
                    op: "patch",
                    message: "build carries no patch".to_string(),
                })?;
                patch::perform(op, runner, workdir, patch).await
            }
            Operation::QueryRevision => runner.run(&revision::command(self.config, backend)).await,
        }
    }

    /// Written beside the workdir: `get` refuses a target that already exists.
    fn context_path(&self) -> PathBuf {
        let workdir = self.config.workdir();
        workdir
            .parent()
            .unwrap_or(workdir)
            .join(self.backend.context_file())
    }

    fn record(
        &mut self,
        operation: &str,
        attempts: u32,
        output: Option<&CommandOutput>,
        failure: Option<&OpFailure>,
    ) {
        self.results.push(OperationResult {
            operation: operation.to_string(),
            attempts,
            exit_code: output.map(|o| o.exit_code),
            stdout: output.map(|o| o.stdout.clone()).unwrap_or_default(),
            stderr: output.map(|o| o.stderr.clone()).unwrap_or_default(),
            failure: failure.map(|f| f.class),
            reason: failure.map(|f| f.reason.clone()),
        });
    }
}
