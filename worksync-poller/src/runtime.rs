use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use worksync_core::MirrorConfig;
use worksync_sync::{CommandRunner, LocalRunner};

use crate::error::{io_err, PollError};
use crate::poller::{MirrorPoller, PollerState};
use crate::sink::{ChangeRecord, ChangeSink};

/// Start polling `config` and block the current thread until ctrl-c.
pub fn start_blocking(
    config: MirrorConfig,
    sink: Arc<dyn ChangeSink>,
) -> Result<PollerState, PollError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let runner: Arc<dyn CommandRunner> = Arc::new(runner_for(&config));
    runtime.block_on(run(MirrorPoller::new(config), runner, sink))
}

/// Runner for the listing command: local, or through the mirror's ssh host.
pub fn runner_for(config: &MirrorConfig) -> LocalRunner {
    let runner = LocalRunner::new(".");
    match &config.ssh_host {
        Some(host) => runner.with_hop(host.clone()),
        None => runner,
    }
}

/// Poll until ctrl-c, returning the final state.
pub async fn run(
    poller: MirrorPoller,
    runner: Arc<dyn CommandRunner>,
    sink: Arc<dyn ChangeSink>,
) -> Result<PollerState, PollError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let poll_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = poll_loop(poller, runner, sink, PollerState::default(), shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, stopping poller");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(PollError::Runtime(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (poll_result, signal_result) = tokio::join!(poll_handle, signal_handle);
    handle_join("signal_handler", signal_result)?;
    handle_join("poller", poll_result)
}

/// Tick every `poll_interval` until a shutdown message arrives.
///
/// The interval's immediate first tick is consumed unless the mirror asks
/// to poll at launch.
pub async fn poll_loop(
    poller: MirrorPoller,
    runner: Arc<dyn CommandRunner>,
    sink: Arc<dyn ChangeSink>,
    mut state: PollerState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<PollerState, PollError> {
    let mut interval = tokio::time::interval(poller.config().poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    if !poller.config().poll_at_launch {
        interval.tick().await;
    }
    tracing::info!(
        poller = %poller.name(),
        interval_secs = poller.config().poll_interval.as_secs(),
        "{}",
        poller.describe()
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                state = run_once(&poller, runner.as_ref(), sink.as_ref(), state).await;
            }
        }
    }
    Ok(state)
}

/// One tick plus delivery. Failures are logged; the poller keeps going.
pub async fn run_once(
    poller: &MirrorPoller,
    runner: &dyn CommandRunner,
    sink: &dyn ChangeSink,
    state: PollerState,
) -> PollerState {
    let now = Utc::now();
    let tick = poller.poll(runner, state, now).await;
    match tick.event {
        Ok(event) => {
            let record = ChangeRecord {
                poller: poller.name(),
                at: now,
                event,
            };
            if let Err(err) = sink.submit(record).await {
                tracing::error!(poller = %poller.name(), error = %err, "failed to deliver change");
            }
        }
        Err(err) => {
            tracing::warn!(poller = %poller.name(), error = %err, "mirror poll failed");
        }
    }
    tick.state
}

fn handle_join<T>(
    task: &'static str,
    result: Result<Result<T, PollError>, tokio::task::JoinError>,
) -> Result<T, PollError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(PollError::Runtime(format!("{task} task join failure: {err}"))),
    }
}

/// Install the fmt subscriber once; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
