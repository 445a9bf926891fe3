//! Synchronization planner.
//!
//! [`plan`] is a pure function of the step config, the workdir observation
//! and the build request. It returns the ordered list of abstract operations
//! that reproduce a correct working copy; nothing here touches a runner.
//!
//! Decision table (after the version and marker probes):
//!
//! ```text
//! mode         marker  other observation        actions
//! full/clobber any     -                        remove, [transfer context], clone
//! full/copy    any     reference has metadata   (remove), pull reference, copy
//! full/copy    any     reference missing        (remove), clone reference, copy
//! incremental  present -                        remove, clone                (revision ignored)
//! incremental  absent  workdir has metadata     pull in place
//! incremental  absent  no workdir metadata      clone
//! ```
//!
//! Full/copy inspects the reference checkout only after the workdir is gone,
//! so that removal runs while observing and the plan records it in its
//! prelude.
//!
//! A patch appends transfer diff, transfer marker, apply, remove diff. The
//! revision query always comes last.

use std::fmt;

use serde::Serialize;
use worksync_core::{BuildRequest, Method, StepConfig, SyncMode};

use crate::patch;
use crate::probe::WorkdirObservation;

/// One abstract step of a synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    ProbeVersion,
    ProbeMarker { present: bool },
    RemoveWorkdir,
    RemoveReference,
    TransferContext,
    CloneAtContext,
    CloneWorkdir,
    CloneReference,
    PullInPlace,
    PullReference,
    CopyReferenceToWorkdir,
    TransferDiff,
    TransferMarker,
    ApplyPatch,
    RemoveDiff,
    QueryRevision,
}

impl Operation {
    /// Operations that reach across the network to the remote repository or
    /// execution hop and may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Operation::ProbeVersion
                | Operation::CloneWorkdir
                | Operation::CloneAtContext
                | Operation::CloneReference
        )
    }

    /// Local cleanup re-run before each re-attempt of a retryable operation.
    pub fn retry_prelude(&self) -> &'static [Operation] {
        match self {
            Operation::CloneWorkdir => &[Operation::RemoveWorkdir],
            Operation::CloneAtContext => &[Operation::RemoveWorkdir, Operation::TransferContext],
            Operation::CloneReference => &[Operation::RemoveReference],
            _ => &[],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::ProbeVersion => "probe version",
            Operation::ProbeMarker { .. } => "probe patched marker",
            Operation::RemoveWorkdir => "remove workdir",
            Operation::RemoveReference => "remove reference",
            Operation::TransferContext => "transfer context",
            Operation::CloneAtContext => "clone at context",
            Operation::CloneWorkdir => "clone workdir",
            Operation::CloneReference => "clone reference",
            Operation::PullInPlace => "pull in place",
            Operation::PullReference => "pull reference",
            Operation::CopyReferenceToWorkdir => "copy reference to workdir",
            Operation::TransferDiff => "transfer diff",
            Operation::TransferMarker => "transfer marker",
            Operation::ApplyPatch => "apply patch",
            Operation::RemoveDiff => "remove diff",
            Operation::QueryRevision => "query revision",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::ProbeMarker { present } => {
                write!(f, "{} ({})", self.name(), if *present { "present" } else { "absent" })
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Ordered operations for one run; immutable once built.
///
/// The `prelude` has already executed by the time the plan exists (the plan
/// depends on what it observed); `actions` are what the executor runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    prelude: Vec<Operation>,
    actions: Vec<Operation>,
}

impl SyncPlan {
    pub fn prelude(&self) -> &[Operation] {
        &self.prelude
    }

    pub fn actions(&self) -> &[Operation] {
        &self.actions
    }

    /// Prelude followed by actions, in execution order.
    pub fn operations(&self) -> Vec<Operation> {
        self.prelude.iter().chain(&self.actions).copied().collect()
    }

    pub fn contains(&self, op: Operation) -> bool {
        self.prelude.contains(&op) || self.actions.contains(&op)
    }
}

/// Modes that remove the workdir before the observation is complete.
pub fn removes_while_observing(mode: SyncMode) -> bool {
    matches!(mode, SyncMode::Full(Method::Copy))
}

/// The revision a run pins to: the build's own, else the configured one.
pub fn effective_revision<'a>(config: &'a StepConfig, request: &'a BuildRequest) -> Option<&'a str> {
    request
        .revision
        .as_deref()
        .or_else(|| config.explicit_revision())
}

/// Build the plan for one run.
pub fn plan(
    config: &StepConfig,
    observation: &WorkdirObservation,
    request: &BuildRequest,
) -> SyncPlan {
    let mut prelude = vec![
        Operation::ProbeVersion,
        Operation::ProbeMarker {
            present: observation.is_patched,
        },
    ];
    if removes_while_observing(config.mode()) {
        prelude.push(Operation::RemoveWorkdir);
    }

    let mut actions = Vec::new();
    match (config.mode(), observation.is_patched) {
        (SyncMode::Full(Method::Clobber), _) => {
            clobber(&mut actions, effective_revision(config, request).is_some());
        }
        (SyncMode::Full(Method::Copy), _) => {
            actions.push(if observation.reference_has_metadata {
                Operation::PullReference
            } else {
                Operation::CloneReference
            });
            actions.push(Operation::CopyReferenceToWorkdir);
        }
        // A patched tree cannot take a clean pull; rebuild it, ignoring any pin.
        (SyncMode::Incremental, true) => clobber(&mut actions, false),
        (SyncMode::Incremental, false) => actions.push(if observation.has_metadata {
            Operation::PullInPlace
        } else {
            Operation::CloneWorkdir
        }),
    }

    if request.patch.is_some() {
        actions.extend_from_slice(patch::OPERATIONS);
    }
    actions.push(Operation::QueryRevision);

    SyncPlan { prelude, actions }
}

fn clobber(actions: &mut Vec<Operation>, pinned: bool) {
    actions.push(Operation::RemoveWorkdir);
    if pinned {
        actions.push(Operation::TransferContext);
        actions.push(Operation::CloneAtContext);
    } else {
        actions.push(Operation::CloneWorkdir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worksync_core::PatchDescriptor;

    use super::Operation::*;

    fn config(mode: SyncMode) -> StepConfig {
        StepConfig::new("http://localhost/darcs", mode).expect("config")
    }

    fn fresh() -> WorkdirObservation {
        WorkdirObservation::default()
    }

    fn warm() -> WorkdirObservation {
        WorkdirObservation {
            has_metadata: true,
            is_patched: false,
            reference_has_metadata: true,
        }
    }

    fn patched() -> WorkdirObservation {
        WorkdirObservation {
            has_metadata: false,
            is_patched: true,
            reference_has_metadata: true,
        }
    }

    fn with_patch() -> BuildRequest {
        BuildRequest {
            revision: None,
            patch: Some(PatchDescriptor::new(1, "patch")),
        }
    }

    #[test]
    fn full_clobber_cold_start() {
        let plan = plan(&config(SyncMode::Full(Method::Clobber)), &fresh(), &BuildRequest::default());
        assert_eq!(
            plan.operations(),
            [
                ProbeVersion,
                ProbeMarker { present: false },
                RemoveWorkdir,
                CloneWorkdir,
                QueryRevision
            ]
        );
    }

    #[test]
    fn full_clobber_with_configured_revision_transfers_context() {
        let cfg = config(SyncMode::Full(Method::Clobber)).with_revision("abcdef01");
        let plan = plan(&cfg, &fresh(), &BuildRequest::default());
        assert_eq!(
            plan.actions(),
            [RemoveWorkdir, TransferContext, CloneAtContext, QueryRevision]
        );
    }

    #[test]
    fn build_revision_also_pins_clobber() {
        let request = BuildRequest {
            revision: Some("abcdef01".into()),
            patch: None,
        };
        let plan = plan(&config(SyncMode::Full(Method::Clobber)), &fresh(), &request);
        assert!(plan.contains(TransferContext));
    }

    #[test]
    fn full_copy_warm_reference_pulls() {
        let plan = plan(&config(SyncMode::Full(Method::Copy)), &warm(), &BuildRequest::default());
        assert_eq!(
            plan.operations(),
            [
                ProbeVersion,
                ProbeMarker { present: false },
                RemoveWorkdir,
                PullReference,
                CopyReferenceToWorkdir,
                QueryRevision
            ]
        );
    }

    #[test]
    fn full_copy_cold_reference_clones_it() {
        let plan = plan(&config(SyncMode::Full(Method::Copy)), &fresh(), &BuildRequest::default());
        assert_eq!(plan.prelude().last(), Some(&RemoveWorkdir));
        assert_eq!(
            plan.actions(),
            [CloneReference, CopyReferenceToWorkdir, QueryRevision]
        );
    }

    #[test]
    fn full_copy_never_uses_context() {
        let cfg = config(SyncMode::Full(Method::Copy)).with_revision("abcdef01");
        let plan = plan(&cfg, &warm(), &BuildRequest::default());
        assert!(!plan.contains(TransferContext));
    }

    #[test]
    fn incremental_with_metadata_pulls_in_place() {
        let plan = plan(&config(SyncMode::Incremental), &warm(), &BuildRequest::default());
        assert_eq!(plan.actions(), [PullInPlace, QueryRevision]);
    }

    #[test]
    fn incremental_without_workdir_clones_directly() {
        let plan = plan(&config(SyncMode::Incremental), &fresh(), &BuildRequest::default());
        assert_eq!(plan.actions(), [CloneWorkdir, QueryRevision]);
    }

    #[test]
    fn incremental_never_removes_an_unpatched_workdir() {
        for obs in [fresh(), warm()] {
            let plan = plan(&config(SyncMode::Incremental), &obs, &BuildRequest::default());
            assert!(!plan.contains(RemoveWorkdir), "{obs:?}");
        }
    }

    #[test]
    fn incremental_ignores_explicit_revision() {
        let cfg = config(SyncMode::Incremental).with_revision("abcdef01");
        let request = BuildRequest {
            revision: Some("1234".into()),
            patch: None,
        };
        for obs in [fresh(), warm(), patched()] {
            let plan = plan(&cfg, &obs, &request);
            assert!(!plan.contains(TransferContext), "{obs:?}");
            assert!(!plan.contains(CloneAtContext), "{obs:?}");
        }
    }

    #[test]
    fn marker_forces_removal_before_any_clone_or_pull() {
        for mode in [
            SyncMode::Incremental,
            SyncMode::Full(Method::Clobber),
            SyncMode::Full(Method::Copy),
        ] {
            let plan = plan(&config(mode), &patched(), &BuildRequest::default());
            let operations = plan.operations();
            assert_eq!(operations[2], RemoveWorkdir, "{mode}");
            assert!(!plan.contains(PullInPlace), "{mode}");
            assert_eq!(
                operations.iter().filter(|op| **op == RemoveWorkdir).count(),
                1,
                "{mode}"
            );
        }
    }

    #[test]
    fn incremental_patched_rebuilds_by_clobber() {
        let plan = plan(&config(SyncMode::Incremental), &patched(), &BuildRequest::default());
        assert_eq!(
            plan.operations(),
            [
                ProbeVersion,
                ProbeMarker { present: true },
                RemoveWorkdir,
                CloneWorkdir,
                QueryRevision
            ]
        );
    }

    #[test]
    fn patch_operations_follow_sync_and_precede_revision() {
        let plan = plan(&config(SyncMode::Incremental), &warm(), &with_patch());
        assert_eq!(
            plan.operations(),
            [
                ProbeVersion,
                ProbeMarker { present: false },
                PullInPlace,
                TransferDiff,
                TransferMarker,
                ApplyPatch,
                RemoveDiff,
                QueryRevision
            ]
        );
    }

    #[test]
    fn patch_is_applied_for_every_mode() {
        for mode in [SyncMode::Full(Method::Clobber), SyncMode::Full(Method::Copy)] {
            let plan = plan(&config(mode), &fresh(), &with_patch());
            let actions = plan.actions();
            assert_eq!(&actions[actions.len() - 5..actions.len() - 1], patch::OPERATIONS);
        }
    }

    #[test]
    fn only_network_operations_are_retryable() {
        assert!(ProbeVersion.is_retryable());
        assert!(CloneWorkdir.is_retryable());
        assert!(!PullInPlace.is_retryable());
        assert!(!RemoveWorkdir.is_retryable());
        assert!(!ApplyPatch.is_retryable());
        assert!(!QueryRevision.is_retryable());
        assert_eq!(CloneAtContext.retry_prelude(), [RemoveWorkdir, TransferContext]);
        assert!(ProbeVersion.retry_prelude().is_empty());
    }

    #[test]
    fn marker_display_names_state() {
        assert_eq!(
            ProbeMarker { present: true }.to_string(),
            "probe patched marker (present)"
        );
    }
}
