use std::path::PathBuf;

use thiserror::Error;

/// Error surface for mirror polling, change sinks and the poll loop.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] worksync_core::ConfigError),

    #[error("listing command failed: {0}")]
    Runner(#[from] worksync_sync::RunnerError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("poller runtime error: {0}")]
    Runtime(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PollError {
    PollError::Io {
        path: path.into(),
        source,
    }
}
