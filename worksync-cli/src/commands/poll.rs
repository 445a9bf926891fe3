//! `worksync poll`: watch an xbps mirror for new packages.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;

use worksync_poller::{
    runner_for, ChangeRecord, ChangeSink, JsonLinesSink, MirrorPoller, PollerState,
};

use super::MirrorSource;

/// Arguments for `worksync poll`.
#[derive(Args, Debug)]
pub struct PollArgs {
    #[command(flatten)]
    pub mirror: MirrorSource,

    /// Poll a single time, print the change event and exit.
    #[arg(long)]
    pub once: bool,

    /// Append change events to this JSON-lines file
    /// (default `~/.worksync/changes.jsonl`).
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl PollArgs {
    pub fn run(self) -> Result<()> {
        let config = self.mirror.load()?;
        let output = match self.output {
            Some(path) => path,
            None => dirs::home_dir()
                .context("could not determine home directory")?
                .join(".worksync")
                .join("changes.jsonl"),
        };
        let sink = JsonLinesSink::new(output);

        if !self.once {
            let name = config.name();
            worksync_poller::start_blocking(config, Arc::new(sink))
                .with_context(|| format!("poller '{name}' stopped with an error"))?;
            return Ok(());
        }

        worksync_poller::init_tracing();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start tokio runtime")?;
        let runner = runner_for(&config);
        let poller = MirrorPoller::new(config);

        runtime.block_on(async {
            let now = Utc::now();
            let tick = poller.poll(&runner, PollerState::default(), now).await;
            let record = ChangeRecord {
                poller: poller.name(),
                at: now,
                event: tick.event.context("mirror poll failed")?,
            };
            println!("{}", serde_json::to_string_pretty(&record)?);
            sink.submit(record)
                .await
                .with_context(|| format!("failed to append to {}", sink.path().display()))
        })
    }
}
