//! Error types for worksync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Every way a step or mirror configuration can be rejected.
///
/// All of these are raised while a config is being constructed; a value of
/// [`crate::StepConfig`] or [`crate::MirrorConfig`] is always valid.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.worksync/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("repository URL is required")]
    MissingRepoUrl,

    #[error("unknown mode '{0}'; expected: full, incremental")]
    UnknownMode(String),

    #[error("unknown method '{0}'; expected: clobber, copy")]
    UnknownMethod(String),

    /// A method that exists for other backends but not for this one.
    #[error("method '{method}' is not supported by the {backend} backend")]
    UnsupportedMethod { method: String, backend: String },

    /// Incremental mode always follows existing history and takes no method.
    #[error("method '{0}' is only valid with mode 'full'")]
    MethodNotAllowed(String),

    #[error("unknown backend '{0}'; expected: darcs")]
    UnknownBackend(String),

    #[error("invalid retry policy: {0}")]
    InvalidRetry(String),

    /// A required field was empty.
    #[error("field '{0}' is required")]
    MissingField(&'static str),
}
