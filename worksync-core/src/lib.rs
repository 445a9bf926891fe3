//! worksync core library: configuration types, validation, errors.
//!
//! Public API surface:
//! - [`types`]: typed step/mirror configuration and run values
//! - [`error`]: [`ConfigError`]
//! - [`config`]: YAML loading and validation of raw configs

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{
    BackendKind, BuildRequest, ChangeEvent, Method, MirrorConfig, PatchDescriptor, RetryPolicy,
    StepConfig, StepOutcome, SyncMode,
};
