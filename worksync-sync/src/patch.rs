//! Patch applier.
//!
//! Re-applies a controller-supplied diff on top of the freshly synchronized
//! tree and leaves [`PATCHED_MARKER`](crate::probe::PATCHED_MARKER) behind so
//! the next run rebuilds from scratch.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use worksync_core::PatchDescriptor;

use crate::error::RunnerError;
use crate::plan::Operation;
use crate::probe::marker_path;
use crate::runner::{CommandOutput, CommandRunner, ShellCommand};

/// Where the diff is written inside the workdir, relative to it.
pub const DIFF_FILE: &str = ".buildbot-diff";

/// Appended to a plan whenever the build carries a patch.
pub const OPERATIONS: &[Operation] = &[
    Operation::TransferDiff,
    Operation::TransferMarker,
    Operation::ApplyPatch,
    Operation::RemoveDiff,
];

pub fn diff_path(workdir: &Path) -> PathBuf {
    workdir.join(DIFF_FILE)
}

/// `patch` with flags that make re-application harmless: forward-only,
/// forced, and tolerant of files the diff empties.
pub fn apply_command(workdir: &Path, level: u32) -> ShellCommand {
    let level = format!("-p{level}");
    ShellCommand::new(
        workdir,
        [
            "patch",
            level.as_str(),
            "--remove-empty-files",
            "--force",
            "--forward",
            "-i",
            DIFF_FILE,
        ],
    )
}

/// Hex SHA-256 of the diff body, recorded in the step report.
pub fn digest(patch: &PatchDescriptor) -> String {
    let mut hasher = Sha256::new();
    hasher.update(patch.diff.as_bytes());
    hex::encode(hasher.finalize())
}

/// Run one of the [`OPERATIONS`] against `workdir`.
pub(crate) async fn perform(
    op: Operation,
    runner: &dyn CommandRunner,
    workdir: &Path,
    patch: &PatchDescriptor,
) -> Result<CommandOutput, RunnerError> {
    match op {
        Operation::TransferDiff => {
            runner
                .download_file(&diff_path(workdir), patch.diff.as_bytes())
                .await?;
            Ok(CommandOutput::default())
        }
        Operation::TransferMarker => {
            runner.download_file(&marker_path(workdir), b"").await?;
            Ok(CommandOutput::default())
        }
        Operation::ApplyPatch => runner.run(&apply_command(workdir, patch.level)).await,
        Operation::RemoveDiff => {
            runner.rmdir(&diff_path(workdir), None).await?;
            Ok(CommandOutput::default())
        }
        other => Err(RunnerError::Rejected {
            op: "patch",
            message: format!("'{other}' is not a patch operation"),
        }),
    }
}
