pub mod plan;
pub mod poll;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use worksync_core::{config, MirrorConfig, StepConfig};

/// A step named under `~/.worksync/steps/`, or an explicit file.
#[derive(Args, Debug)]
pub struct StepSource {
    /// Step name (`~/.worksync/steps/<name>.yaml`).
    #[arg(required_unless_present = "file")]
    pub name: Option<String>,

    /// Read the step config from this file instead.
    #[arg(long, conflicts_with = "name")]
    pub file: Option<PathBuf>,
}

impl StepSource {
    pub fn load(&self) -> Result<StepConfig> {
        match (&self.file, &self.name) {
            (Some(path), _) => config::load_step_file(path)
                .with_context(|| format!("failed to load step from {}", path.display())),
            (None, Some(name)) => {
                let home = dirs::home_dir().context("could not determine home directory")?;
                config::load_step_at(&home, name)
                    .with_context(|| format!("failed to load step '{name}'"))
            }
            (None, None) => anyhow::bail!("provide a step name or --file"),
        }
    }
}

/// A mirror named under `~/.worksync/mirrors/`, or an explicit file.
#[derive(Args, Debug)]
pub struct MirrorSource {
    /// Mirror name (`~/.worksync/mirrors/<name>.yaml`).
    #[arg(required_unless_present = "file")]
    pub name: Option<String>,

    /// Read the mirror config from this file instead.
    #[arg(long, conflicts_with = "name")]
    pub file: Option<PathBuf>,
}

impl MirrorSource {
    pub fn load(&self) -> Result<MirrorConfig> {
        match (&self.file, &self.name) {
            (Some(path), _) => config::load_mirror_file(path)
                .with_context(|| format!("failed to load mirror from {}", path.display())),
            (None, Some(name)) => {
                let home = dirs::home_dir().context("could not determine home directory")?;
                config::load_mirror_at(&home, name)
                    .with_context(|| format!("failed to load mirror '{name}'"))
            }
            (None, None) => anyhow::bail!("provide a mirror name or --file"),
        }
    }
}
