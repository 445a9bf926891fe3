//! Workdir prober.
//!
//! Recomputed on every run, never persisted. Only the stats the planner can
//! act on are issued: workdir metadata matters to an unpatched incremental
//! workdir alone, the reference checkout to full/copy alone. Full/copy
//! removes the workdir before it looks at the reference.

use std::path::{Path, PathBuf};

use serde::Serialize;
use worksync_core::SyncMode;

use crate::executor::{Executor, Halted};
use crate::plan::{removes_while_observing, Operation};

/// Sentinel left in a workdir that carries an out-of-band patch.
pub const PATCHED_MARKER: &str = ".buildbot-patched";

/// What the prober saw in the working directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkdirObservation {
    /// Backend metadata inside the workdir; probed in incremental mode only.
    pub has_metadata: bool,
    pub is_patched: bool,
    /// Backend metadata inside the reference checkout; probed for full/copy only.
    pub reference_has_metadata: bool,
}

pub fn marker_path(workdir: &Path) -> PathBuf {
    workdir.join(PATCHED_MARKER)
}

/// Stat the marker, then whichever metadata the mode needs.
pub async fn observe(exec: &mut Executor<'_>) -> Result<WorkdirObservation, Halted> {
    let config = exec.config();
    let backend = exec.backend();
    let workdir = config.workdir();

    let is_patched = exec.probe("stat patched marker", &marker_path(workdir)).await?;

    let has_metadata = match config.mode() {
        SyncMode::Incremental if !is_patched => {
            exec.probe("stat workdir metadata", &workdir.join(backend.metadata_dir()))
                .await?
        }
        _ => false,
    };

    let reference_has_metadata = if removes_while_observing(config.mode()) {
        exec.execute(Operation::RemoveWorkdir).await?;
        let metadata = config.reference_dir().join(backend.metadata_dir());
        exec.probe("stat reference metadata", &metadata).await?
    } else {
        false
    };

    let observation = WorkdirObservation {
        has_metadata,
        is_patched,
        reference_has_metadata,
    };
    tracing::debug!(?observation, workdir = %workdir.display(), "observed workdir");
    Ok(observation)
}
