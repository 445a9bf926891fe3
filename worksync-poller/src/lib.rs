//! Mirror poller: turns newly mirrored xbps packages into change events.

mod error;
pub mod poller;
mod runtime;
pub mod sink;

pub use error::PollError;
pub use poller::{changed_templates, package_name, MirrorPoller, PollerState, Tick};
pub use runtime::{init_tracing, poll_loop, run, run_once, runner_for, start_blocking};
pub use sink::{ChangeRecord, ChangeSink, ChannelSink, JsonLinesSink};
