//! Domain types for synchronization steps and mirror polling.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Typed configs are only ever produced by validating constructors, so the
//! planner can match exhaustively without re-checking combinations.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How a full-mode step rebuilds the working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Remove the workdir and clone straight into it.
    Clobber,
    /// Refresh a long-lived reference checkout and copy it over.
    Copy,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Clobber => write!(f, "clobber"),
            Method::Copy => write!(f, "copy"),
        }
    }
}

/// Mode and method as one closed variant; incremental mode carries no method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncMode {
    Full(Method),
    Incremental,
}

impl SyncMode {
    pub fn method(&self) -> Option<Method> {
        match self {
            SyncMode::Full(method) => Some(*method),
            SyncMode::Incremental => None,
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full(method) => write!(f, "full/{method}"),
            SyncMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Version-control backend a step drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Darcs,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Darcs => write!(f, "darcs"),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Fixed-interval retry budget for operations marked retryable.
///
/// `retries` counts re-attempts, so `retries = 2` allows three tries in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub retries: u32,
}

impl RetryPolicy {
    pub fn new(interval: Duration, retries: u32) -> Self {
        Self { interval, retries }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

// ---------------------------------------------------------------------------
// Step configuration
// ---------------------------------------------------------------------------

/// Immutable configuration of one synchronization step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepConfig {
    repo_url: String,
    mode: SyncMode,
    backend: BackendKind,
    workdir: PathBuf,
    reference_dir: PathBuf,
    remote_hop: Option<String>,
    explicit_revision: Option<String>,
    retry: Option<RetryPolicy>,
}

impl StepConfig {
    pub const DEFAULT_WORKDIR: &'static str = "build";
    pub const DEFAULT_REFERENCE_DIR: &'static str = "source";

    /// Build a config for `repo_url`; an empty or blank URL is rejected.
    pub fn new(repo_url: impl Into<String>, mode: SyncMode) -> Result<Self, ConfigError> {
        let repo_url = repo_url.into();
        if repo_url.trim().is_empty() {
            return Err(ConfigError::MissingRepoUrl);
        }
        Ok(Self {
            repo_url,
            mode,
            backend: BackendKind::default(),
            workdir: PathBuf::from(Self::DEFAULT_WORKDIR),
            reference_dir: PathBuf::from(Self::DEFAULT_REFERENCE_DIR),
            remote_hop: None,
            explicit_revision: None,
            retry: None,
        })
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn with_reference_dir(mut self, reference_dir: impl Into<PathBuf>) -> Self {
        self.reference_dir = reference_dir.into();
        self
    }

    pub fn with_remote_hop(mut self, hop: impl Into<String>) -> Self {
        self.remote_hop = Some(hop.into());
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.explicit_revision = Some(revision.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn reference_dir(&self) -> &Path {
        &self.reference_dir
    }

    pub fn remote_hop(&self) -> Option<&str> {
        self.remote_hop.as_deref()
    }

    pub fn explicit_revision(&self) -> Option<&str> {
        self.explicit_revision.as_deref()
    }

    pub fn retry(&self) -> Option<RetryPolicy> {
        self.retry
    }
}

// ---------------------------------------------------------------------------
// Per-build inputs and outcome
// ---------------------------------------------------------------------------

/// An out-of-band diff supplied by the controller for one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchDescriptor {
    /// Leading path components stripped by `patch -p<level>`.
    pub level: u32,
    pub diff: String,
}

impl PatchDescriptor {
    pub fn new(level: u32, diff: impl Into<String>) -> Self {
        Self {
            level,
            diff: diff.into(),
        }
    }
}

/// Inputs that vary per build rather than per step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildRequest {
    /// Revision requested by the build; takes precedence over the configured one.
    pub revision: Option<String>,
    pub patch: Option<PatchDescriptor>,
}

/// Terminal result of one step run, reported to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum StepOutcome {
    Success { revision: String },
    Failure { reason: String },
    /// The whole step should be rescheduled later.
    Retry { reason: String },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success { .. })
    }

    pub fn revision(&self) -> Option<&str> {
        match self {
            StepOutcome::Success { revision } => Some(revision),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Success { .. } => "success",
            StepOutcome::Failure { .. } => "failure",
            StepOutcome::Retry { .. } => "retry",
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Success { revision } => write!(f, "success ({revision})"),
            StepOutcome::Failure { reason } => write!(f, "failure: {reason}"),
            StepOutcome::Retry { reason } => write!(f, "retry: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Mirror polling
// ---------------------------------------------------------------------------

/// Configuration of one mirror poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub rsync_url: String,
    pub local_dir: PathBuf,
    pub arch: String,
    pub ssh_host: Option<String>,
    pub poll_interval: Duration,
    pub poll_at_launch: bool,
    pub listing_command: String,
    pub author: String,
    pub comments: String,
    pub branch: String,
}

impl MirrorConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(120);
    pub const DEFAULT_LISTING_COMMAND: &'static str = "./new_on_mirror.bash";

    pub fn new(
        rsync_url: impl Into<String>,
        local_dir: impl Into<PathBuf>,
        arch: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let rsync_url = rsync_url.into();
        let local_dir = local_dir.into();
        let arch = arch.into();
        if rsync_url.trim().is_empty() {
            return Err(ConfigError::MissingField("rsync_url"));
        }
        if local_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("local_dir"));
        }
        if arch.trim().is_empty() {
            return Err(ConfigError::MissingField("arch"));
        }
        Ok(Self {
            rsync_url,
            local_dir,
            arch,
            ssh_host: None,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            poll_at_launch: false,
            listing_command: Self::DEFAULT_LISTING_COMMAND.to_string(),
            author: "someone".to_string(),
            comments: "----".to_string(),
            branch: "master".to_string(),
        })
    }

    /// `"<arch> <rsync_url>"`, the poller's identity.
    pub fn name(&self) -> String {
        format!("{} {}", self.arch, self.rsync_url)
    }

    pub fn describe(&self) -> String {
        format!(
            "Getting changes for arch {} from xbps mirror {}",
            self.arch, self.rsync_url
        )
    }
}

/// One aggregated change handed to the change-ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub author: String,
    pub files: Vec<String>,
    pub comments: String,
    pub branch: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_repo_url_is_rejected() {
        let err = StepConfig::new("   ", SyncMode::Incremental).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRepoUrl));
    }

    #[test]
    fn step_defaults() {
        let cfg = StepConfig::new("http://localhost/darcs", SyncMode::Full(Method::Clobber))
            .expect("config");
        assert_eq!(cfg.workdir(), Path::new("build"));
        assert_eq!(cfg.reference_dir(), Path::new("source"));
        assert_eq!(cfg.backend(), BackendKind::Darcs);
        assert!(cfg.retry().is_none());
        assert!(cfg.explicit_revision().is_none());
    }

    #[test]
    fn retry_attempts_include_first_try() {
        let policy = RetryPolicy::new(Duration::ZERO, 2);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(RetryPolicy::new(Duration::ZERO, u32::MAX).max_attempts(), u32::MAX);
    }

    #[test]
    fn mode_display() {
        assert_eq!(SyncMode::Full(Method::Copy).to_string(), "full/copy");
        assert_eq!(SyncMode::Incremental.to_string(), "incremental");
        assert_eq!(SyncMode::Incremental.method(), None);
    }

    #[test]
    fn outcome_serializes_with_result_tag() {
        let outcome = StepOutcome::Retry {
            reason: "connection lost".into(),
        };
        let json = serde_yaml::to_string(&outcome).expect("serialize");
        assert!(json.contains("result: retry"));
        assert!(outcome.revision().is_none());
        assert_eq!(outcome.label(), "retry");
    }

    #[test]
    fn mirror_name_and_defaults() {
        let mirror =
            MirrorConfig::new("rsync://repo/current", "/srv/mirror", "x86_64").expect("mirror");
        assert_eq!(mirror.name(), "x86_64 rsync://repo/current");
        assert_eq!(mirror.poll_interval, Duration::from_secs(120));
        assert!(!mirror.poll_at_launch);
        assert_eq!(mirror.branch, "master");
        assert!(mirror.describe().contains("x86_64"));
    }

    #[test]
    fn mirror_requires_arch() {
        let err = MirrorConfig::new("rsync://repo", "/srv", "").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("arch")));
    }
}
