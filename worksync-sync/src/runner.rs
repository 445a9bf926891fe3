//! Command Runner boundary.
//!
//! The synchronizer never touches processes or the filesystem itself; every
//! side effect goes through a [`CommandRunner`], one awaited call at a time.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::RunnerError;

/// Timeout hint for whole-tree operations (removal, reference copy).
pub const BULK_TIMEOUT: Duration = Duration::from_secs(1200);

/// An external command and the directory it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub workdir: PathBuf,
    pub argv: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ShellCommand {
    pub fn new<I, S>(workdir: impl Into<PathBuf>, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            workdir: workdir.into(),
            argv: argv.into_iter().map(Into::into).collect(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// Exit status and captured streams of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-blank line of stderr, falling back to stdout.
    pub fn last_line(&self) -> Option<&str> {
        last_nonblank(&self.stderr).or_else(|| last_nonblank(&self.stdout))
    }
}

fn last_nonblank(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

/// Asynchronous execution capability consumed by the synchronizer and poller.
///
/// Paths are interpreted by the implementation (usually relative to a
/// builder base directory, possibly on a remote host).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, RunnerError>;

    async fn stat(&self, path: &Path) -> Result<bool, RunnerError>;

    /// Remove a directory tree or a single file. Absent paths are not an error.
    async fn rmdir(&self, path: &Path, timeout: Option<Duration>) -> Result<(), RunnerError>;

    async fn copydir(
        &self,
        from: &Path,
        to: &Path,
        timeout: Option<Duration>,
    ) -> Result<(), RunnerError>;

    /// Write `content` to `dest`, creating parent directories.
    async fn download_file(&self, dest: &Path, content: &[u8]) -> Result<(), RunnerError>;
}
