//! Revision resolver: one backend query against the final workdir.

use worksync_core::StepConfig;

use crate::backend::VcsBackend;
use crate::retry::OpFailure;
use crate::runner::{CommandOutput, ShellCommand};

pub fn command(config: &StepConfig, backend: &dyn VcsBackend) -> ShellCommand {
    ShellCommand::new(config.workdir(), backend.revision_argv())
}

/// The reported revision, stored verbatim apart from trimming.
///
/// A query that succeeds but prints nothing still invalidates the run:
/// downstream consumers key off this string.
pub fn resolve(backend: &dyn VcsBackend, output: &CommandOutput) -> Result<String, OpFailure> {
    backend
        .parse_revision(&output.stdout)
        .ok_or_else(|| OpFailure::fatal(format!("{} revision query returned no output", backend.name())))
}
