//! Version-control backends.
//!
//! The planner and executor only speak in abstract operations; a backend
//! turns those into concrete argv vectors and parses the one piece of
//! command output the step reports (the current revision).

use std::fmt;
use std::path::Path;

use worksync_core::BackendKind;

/// Command vocabulary of one version-control system.
pub trait VcsBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Directory whose presence marks an initialised working copy.
    fn metadata_dir(&self) -> &'static str;

    /// File, next to the workdir, that carries the context for a pinned clone.
    fn context_file(&self) -> &'static str;

    fn version_argv(&self) -> Vec<String>;

    /// Clone `repo_url` into `dest`, optionally pinned to a context file.
    /// Runs from the builder base directory.
    fn clone_argv(&self, repo_url: &str, dest: &Path, context: Option<&Path>) -> Vec<String>;

    /// Pull all new history into the repository in the current directory.
    fn pull_argv(&self) -> Vec<String>;

    /// Query limited to the most recent history entry.
    fn revision_argv(&self) -> Vec<String>;

    /// Extract the revision string from the revision query's stdout.
    fn parse_revision(&self, stdout: &str) -> Option<String>;
}

/// Darcs, driven through its command-line client.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Darcs;

impl VcsBackend for Darcs {
    fn name(&self) -> &'static str {
        "darcs"
    }

    fn metadata_dir(&self) -> &'static str {
        "_darcs"
    }

    fn context_file(&self) -> &'static str {
        ".darcs-context"
    }

    fn version_argv(&self) -> Vec<String> {
        argv(["darcs", "--version"])
    }

    fn clone_argv(&self, repo_url: &str, dest: &Path, context: Option<&Path>) -> Vec<String> {
        let mut args = argv(["darcs", "get", "--verbose", "--lazy", "--repo-name"]);
        args.push(dest.display().to_string());
        if let Some(context) = context {
            args.push("--context".to_string());
            args.push(context.display().to_string());
        }
        args.push(repo_url.to_string());
        args
    }

    fn pull_argv(&self) -> Vec<String> {
        argv(["darcs", "pull", "--all", "--verbose"])
    }

    fn revision_argv(&self) -> Vec<String> {
        argv(["darcs", "changes", "--max-count=1"])
    }

    fn parse_revision(&self, stdout: &str) -> Option<String> {
        let trimmed = stdout.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// The backend implementation for a configured kind.
pub fn backend_for(kind: BackendKind) -> &'static dyn VcsBackend {
    match kind {
        BackendKind::Darcs => &Darcs,
    }
}

fn argv<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
