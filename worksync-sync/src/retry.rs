//! Failure classification and the bounded, fixed-interval retry policy.

use std::time::Duration;

use serde::Serialize;
use worksync_core::{RetryPolicy, StepOutcome};

use crate::error::RunnerError;
use crate::runner::CommandOutput;

/// How a failed operation affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureClass {
    /// Worth re-attempting; surfaces as a `Retry` outcome once the budget is spent.
    Transient,
    /// Ends the run with a `Failure` outcome immediately.
    Fatal,
}

/// A classified operation failure with a short human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpFailure {
    pub class: FailureClass,
    pub reason: String,
    pub exit_code: Option<i32>,
}

impl OpFailure {
    /// Non-zero exit. Only operations marked retryable fail transiently.
    pub fn from_exit(operation: &str, output: &CommandOutput, retryable: bool) -> Self {
        let reason = match output.last_line() {
            Some(line) => format!("{operation} failed (exit {}): {line}", output.exit_code),
            None => format!("{operation} failed (exit {})", output.exit_code),
        };
        Self {
            class: if retryable {
                FailureClass::Transient
            } else {
                FailureClass::Fatal
            },
            reason,
            exit_code: Some(output.exit_code),
        }
    }

    /// Runner-level error. Connection loss is transient on any operation.
    pub fn from_error(operation: &str, err: &RunnerError) -> Self {
        Self {
            class: if err.is_connection_lost() {
                FailureClass::Transient
            } else {
                FailureClass::Fatal
            },
            reason: format!("{operation}: {err}"),
            exit_code: None,
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Fatal,
            reason: reason.into(),
            exit_code: None,
        }
    }

    pub fn into_outcome(self) -> StepOutcome {
        match self.class {
            FailureClass::Transient => StepOutcome::Retry {
                reason: self.reason,
            },
            FailureClass::Fatal => StepOutcome::Failure {
                reason: self.reason,
            },
        }
    }
}

/// Applies a step's [`RetryPolicy`] to operations marked retryable.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryController {
    policy: Option<RetryPolicy>,
}

impl RetryController {
    pub fn new(policy: Option<RetryPolicy>) -> Self {
        Self { policy }
    }

    /// Total tries allowed for an operation; never less than one.
    pub fn max_attempts(&self, retryable: bool) -> u32 {
        match (retryable, self.policy) {
            (true, Some(policy)) => policy.max_attempts(),
            _ => 1,
        }
    }

    /// Whether a failure on attempt `attempt` (1-based) earns another try.
    pub fn should_retry(&self, failure: &OpFailure, attempt: u32, retryable: bool) -> bool {
        failure.class == FailureClass::Transient && attempt < self.max_attempts(retryable)
    }

    pub fn interval(&self) -> Duration {
        self.policy.map(|p| p.interval).unwrap_or_default()
    }

    pub async fn wait(&self) {
        let interval = self.interval();
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }
}
