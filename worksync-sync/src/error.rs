//! Error types for worksync-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures reported by a [`crate::CommandRunner`].
///
/// A non-zero exit status is not an error at this level; it comes back as a
/// [`crate::CommandOutput`] and is interpreted by the executor.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The execution hop went away mid-command.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("{what} timed out after {}s", timeout.as_secs())]
    Timeout { what: String, timeout: Duration },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A filesystem operation completed but reported failure.
    #[error("{op} failed: {message}")]
    Rejected { op: &'static str, message: String },
}

impl RunnerError {
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, RunnerError::ConnectionLost(_))
    }
}

/// Convenience constructor for [`RunnerError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RunnerError {
    RunnerError::Io {
        path: path.into(),
        source,
    }
}

/// Failures around a synchronization step, outside the run itself.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] worksync_core::ConfigError),

    #[error("failed to serialize step report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write step report to {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
