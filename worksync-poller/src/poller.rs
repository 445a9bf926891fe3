//! xbps mirror poller.
//!
//! One tick runs the mirror's listing command, keeps the lines naming a
//! package built for the configured architecture, and folds them into a
//! single [`ChangeEvent`] touching each package's template. The tick is a
//! plain function of a [`PollerState`] value; nothing is held between ticks
//! apart from what the caller passes back in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use worksync_core::{ChangeEvent, MirrorConfig};
use worksync_sync::{CommandRunner, ShellCommand};

use crate::error::PollError;

/// Timestamps carried from one tick to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerState {
    /// Set on every tick, successful or not.
    pub last_poll: Option<DateTime<Utc>>,
    /// Set whenever a tick produced an event.
    pub last_change: Option<DateTime<Utc>>,
}

/// Result of one tick. `state` is always advanced.
#[derive(Debug)]
pub struct Tick {
    pub state: PollerState,
    pub event: Result<ChangeEvent, PollError>,
}

#[derive(Debug, Clone)]
pub struct MirrorPoller {
    config: MirrorConfig,
}

impl MirrorPoller {
    pub fn new(config: MirrorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn name(&self) -> String {
        self.config.name()
    }

    pub fn describe(&self) -> String {
        self.config.describe()
    }

    /// `<listing_command> <rsync_url> <local_dir>`. The ssh hop, if any, is
    /// the runner's business.
    pub fn listing_command(&self) -> ShellCommand {
        ShellCommand::new(
            ".",
            [
                self.config.listing_command.clone(),
                self.config.rsync_url.clone(),
                self.config.local_dir.display().to_string(),
            ],
        )
    }

    /// Build the event for one listing.
    pub fn change_event(&self, listing: &str) -> ChangeEvent {
        ChangeEvent {
            author: self.config.author.clone(),
            files: changed_templates(listing, &self.config.arch),
            comments: self.config.comments.clone(),
            branch: self.config.branch.clone(),
        }
    }

    /// Run one tick at `now`.
    pub async fn poll(
        &self,
        runner: &dyn CommandRunner,
        state: PollerState,
        now: DateTime<Utc>,
    ) -> Tick {
        let mut state = PollerState {
            last_poll: Some(now),
            ..state
        };
        let command = self.listing_command();
        tracing::debug!(poller = %self.name(), command = %command, "polling mirror");

        let output = match runner.run(&command).await {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(poller = %self.name(), error = %err, "listing command failed");
                return Tick {
                    state,
                    event: Err(err.into()),
                };
            }
        };
        if !output.success() {
            tracing::warn!(
                poller = %self.name(),
                exit_code = output.exit_code,
                "listing command exited non-zero; parsing its output anyway"
            );
        }

        // stderr carries rsync diagnostics, never listing lines.
        let event = self.change_event(&output.stdout);
        tracing::info!(
            poller = %self.name(),
            files = event.files.len(),
            "mirror poll produced change"
        );
        state.last_change = Some(now);
        Tick {
            state,
            event: Ok(event),
        }
    }
}

/// `srcpkgs/<name>/template` for every listed package of `arch`, in
/// listing order.
pub fn changed_templates(listing: &str, arch: &str) -> Vec<String> {
    let suffix = format!(".{arch}.xbps");
    listing
        .lines()
        .map(str::trim)
        .filter(|line| line.ends_with(&suffix))
        .filter_map(package_name)
        .map(|name| format!("srcpkgs/{name}/template"))
        .collect()
}

/// Everything before the last hyphen: `foo-bar-1.0_1.x86_64.xbps` → `foo-bar`.
pub fn package_name(file: &str) -> Option<&str> {
    file.rsplit_once('-')
        .map(|(name, _)| name)
        .filter(|name| !name.is_empty())
}
