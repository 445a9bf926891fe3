//! YAML step and mirror configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.worksync/
//!   steps/
//!     <name>.yaml     (one synchronization step per file)
//!   mirrors/
//!     <name>.yaml     (one mirror poller per file)
//! ```
//!
//! # API pattern
//!
//! Every loader has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Files deserialize into loosely-typed `Raw*` structs first; the only way to
//! a typed config is through `TryFrom`, which performs every check.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{BackendKind, Method, MirrorConfig, RetryPolicy, StepConfig, SyncMode};

// ---------------------------------------------------------------------------
// 1. Raw (as written) configs
// ---------------------------------------------------------------------------

/// Retry pair as written in YAML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRetry {
    pub interval_secs: u64,
    pub count: u32,
}

/// A step config exactly as it appears on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStepConfig {
    #[serde(default)]
    pub repourl: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub reference_dir: Option<PathBuf>,
    #[serde(default)]
    pub remote_hop: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub retry: Option<RawRetry>,
}

/// A mirror config exactly as it appears on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMirrorConfig {
    #[serde(default)]
    pub rsync_url: String,
    #[serde(default)]
    pub local_dir: PathBuf,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub ssh_host: Option<String>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub poll_at_launch: bool,
    #[serde(default)]
    pub listing_command: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
}

// ---------------------------------------------------------------------------
// 2. Validation
// ---------------------------------------------------------------------------

fn parse_backend(raw: Option<&str>) -> Result<BackendKind, ConfigError> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None | Some("darcs") => Ok(BackendKind::Darcs),
        Some(other) => Err(ConfigError::UnknownBackend(other.to_string())),
    }
}

fn parse_method(raw: &str, backend: BackendKind) -> Result<Method, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "clobber" => Ok(Method::Clobber),
        "copy" => Ok(Method::Copy),
        // Methods other backends offer; darcs cannot clean a tree in place.
        "fresh" | "clean" => Err(ConfigError::UnsupportedMethod {
            method: raw.to_string(),
            backend: backend.to_string(),
        }),
        other => Err(ConfigError::UnknownMethod(other.to_string())),
    }
}

/// Resolve the mode/method pair. Full mode without a method means copy.
pub fn parse_mode(
    mode: Option<&str>,
    method: Option<&str>,
    backend: BackendKind,
) -> Result<SyncMode, ConfigError> {
    match mode.map(str::to_ascii_lowercase).as_deref() {
        Some("full") => {
            let method = match method {
                Some(m) => parse_method(m, backend)?,
                None => Method::Copy,
            };
            Ok(SyncMode::Full(method))
        }
        None | Some("incremental") => match method {
            Some(m) => Err(ConfigError::MethodNotAllowed(m.to_string())),
            None => Ok(SyncMode::Incremental),
        },
        Some(other) => Err(ConfigError::UnknownMode(other.to_string())),
    }
}

impl TryFrom<RawStepConfig> for StepConfig {
    type Error = ConfigError;

    fn try_from(raw: RawStepConfig) -> Result<Self, Self::Error> {
        let repo_url = raw.repourl.ok_or(ConfigError::MissingRepoUrl)?;
        let backend = parse_backend(raw.backend.as_deref())?;
        let mode = parse_mode(raw.mode.as_deref(), raw.method.as_deref(), backend)?;

        let mut config = StepConfig::new(repo_url, mode)?.with_backend(backend);
        if let Some(workdir) = raw.workdir {
            if workdir.as_os_str().is_empty() {
                return Err(ConfigError::MissingField("workdir"));
            }
            config = config.with_workdir(workdir);
        }
        if let Some(reference) = raw.reference_dir {
            config = config.with_reference_dir(reference);
        }
        if let Some(hop) = raw.remote_hop.filter(|h| !h.trim().is_empty()) {
            config = config.with_remote_hop(hop);
        }
        if let Some(revision) = raw.revision.filter(|r| !r.trim().is_empty()) {
            config = config.with_revision(revision);
        }
        if let Some(retry) = raw.retry {
            if retry.interval_secs > 24 * 60 * 60 {
                return Err(ConfigError::InvalidRetry(format!(
                    "interval of {}s exceeds one day",
                    retry.interval_secs
                )));
            }
            config = config.with_retry(RetryPolicy::new(
                Duration::from_secs(retry.interval_secs),
                retry.count,
            ));
        }
        Ok(config)
    }
}

impl TryFrom<RawMirrorConfig> for MirrorConfig {
    type Error = ConfigError;

    fn try_from(raw: RawMirrorConfig) -> Result<Self, Self::Error> {
        let mut mirror = MirrorConfig::new(raw.rsync_url, raw.local_dir, raw.arch)?;
        mirror.ssh_host = raw.ssh_host.filter(|h| !h.trim().is_empty());
        if let Some(secs) = raw.poll_interval_secs {
            if secs == 0 {
                return Err(ConfigError::MissingField("poll_interval_secs"));
            }
            mirror.poll_interval = Duration::from_secs(secs);
        }
        mirror.poll_at_launch = raw.poll_at_launch;
        if let Some(cmd) = raw.listing_command {
            mirror.listing_command = cmd;
        }
        if let Some(author) = raw.author {
            mirror.author = author;
        }
        if let Some(comments) = raw.comments {
            mirror.comments = comments;
        }
        if let Some(branch) = raw.branch {
            mirror.branch = branch;
        }
        Ok(mirror)
    }
}

// ---------------------------------------------------------------------------
// 3. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.worksync/steps/<name>.yaml`: pure, no I/O.
pub fn step_path_at(home: &Path, name: &str) -> PathBuf {
    home.join(".worksync")
        .join("steps")
        .join(format!("{name}.yaml"))
}

/// `<home>/.worksync/mirrors/<name>.yaml`: pure, no I/O.
pub fn mirror_path_at(home: &Path, name: &str) -> PathBuf {
    home.join(".worksync")
        .join("mirrors")
        .join(format!("{name}.yaml"))
}

// ---------------------------------------------------------------------------
// 4. Load
// ---------------------------------------------------------------------------

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load and validate a step config from an explicit file path.
pub fn load_step_file(path: &Path) -> Result<StepConfig, ConfigError> {
    let raw: RawStepConfig = read_yaml(path)?;
    StepConfig::try_from(raw)
}

/// Load and validate a mirror config from an explicit file path.
pub fn load_mirror_file(path: &Path) -> Result<MirrorConfig, ConfigError> {
    let raw: RawMirrorConfig = read_yaml(path)?;
    MirrorConfig::try_from(raw)
}

/// Load the named step from `<home>/.worksync/steps/<name>.yaml`.
pub fn load_step_at(home: &Path, name: &str) -> Result<StepConfig, ConfigError> {
    load_step_file(&step_path_at(home, name))
}

/// `load_step_at` convenience wrapper.
pub fn load_step(name: &str) -> Result<StepConfig, ConfigError> {
    load_step_at(&home()?, name)
}

/// Load the named mirror from `<home>/.worksync/mirrors/<name>.yaml`.
pub fn load_mirror_at(home: &Path, name: &str) -> Result<MirrorConfig, ConfigError> {
    load_mirror_file(&mirror_path_at(home, name))
}

/// `load_mirror_at` convenience wrapper.
pub fn load_mirror(name: &str) -> Result<MirrorConfig, ConfigError> {
    load_mirror_at(&home()?, name)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn raw(mode: Option<&str>, method: Option<&str>) -> RawStepConfig {
        RawStepConfig {
            repourl: Some("http://localhost/darcs".into()),
            mode: mode.map(String::from),
            method: method.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn step_path_is_correct() {
        let home = TempDir::new().expect("tempdir");
        let path = step_path_at(home.path(), "darcs-trunk");
        assert!(path.ends_with(".worksync/steps/darcs-trunk.yaml"));
    }

    #[test]
    fn full_without_method_defaults_to_copy() {
        let cfg = StepConfig::try_from(raw(Some("full"), None)).expect("config");
        assert_eq!(cfg.mode(), SyncMode::Full(Method::Copy));
    }

    #[test]
    fn missing_mode_means_incremental() {
        let cfg = StepConfig::try_from(raw(None, None)).expect("config");
        assert_eq!(cfg.mode(), SyncMode::Incremental);
    }

    #[test]
    fn empty_config_is_rejected() {
        let err = StepConfig::try_from(RawStepConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRepoUrl));
    }

    #[test]
    fn retry_pair_is_carried_over() {
        let mut r = raw(Some("full"), Some("clobber"));
        r.retry = Some(RawRetry {
            interval_secs: 0,
            count: 2,
        });
        let cfg = StepConfig::try_from(r).expect("config");
        assert_eq!(cfg.retry().map(|p| p.max_attempts()), Some(3));
    }

    #[test]
    fn load_missing_step_returns_not_found() {
        let home = TempDir::new().expect("tempdir");
        let err = load_step_at(home.path(), "nope").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(ConfigError::HomeNotFound.to_string().contains("home directory"));
    }
}
