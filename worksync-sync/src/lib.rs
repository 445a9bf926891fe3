//! # worksync-sync
//!
//! Working-copy synchronizer for a version-controlled source tree.
//!
//! A run probes the workdir through a [`CommandRunner`], builds a
//! [`SyncPlan`] from what it saw, executes the plan one operation at a time
//! under the step's retry policy, and reports a single [`StepOutcome`]
//! inside a [`StepReport`]. Call [`Synchronizer::run`] for the whole thing,
//! or [`plan::plan`] to inspect the decision for a given observation.
//!
//! [`StepOutcome`]: worksync_core::StepOutcome

pub mod backend;
pub mod error;
pub mod executor;
pub mod local;
pub mod patch;
pub mod plan;
pub mod probe;
pub mod retry;
pub mod revision;
pub mod runner;
pub mod step;
pub mod testing;

pub use backend::{backend_for, Darcs, VcsBackend};
pub use error::{RunnerError, SyncError};
pub use executor::OperationResult;
pub use local::LocalRunner;
pub use plan::{Operation, SyncPlan};
pub use probe::WorkdirObservation;
pub use retry::{FailureClass, RetryController};
pub use runner::{CommandOutput, CommandRunner, ShellCommand, BULK_TIMEOUT};
pub use step::{StepReport, Synchronizer};
