//! Scripted [`CommandRunner`] for tests.
//!
//! A [`ScriptedRunner`] holds the exact sequence of runner calls a run is
//! expected to make, each paired with the result to hand back. Every actual
//! call is checked against the next expectation; a mismatch panics with
//! both calls printed.
//!
//! ```
//! use worksync_sync::testing::{Expect, ScriptedRunner};
//!
//! let runner = ScriptedRunner::new([
//!     Expect::shell("wkdir", ["darcs", "--version"]),
//!     Expect::stat("wkdir/.buildbot-patched").exists(false),
//! ]);
//! assert_eq!(runner.remaining(), 2);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::RunnerError;
use crate::runner::{CommandOutput, CommandRunner, ShellCommand};

/// One call made against a runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Shell(ShellCommand),
    Stat(PathBuf),
    Rmdir {
        path: PathBuf,
        timeout: Option<Duration>,
    },
    Copydir {
        from: PathBuf,
        to: PathBuf,
        timeout: Option<Duration>,
    },
    Download {
        dest: PathBuf,
        content: Vec<u8>,
    },
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Call::Shell(cmd) => write!(f, "shell [{}] {cmd}", cmd.workdir.display()),
            Call::Stat(path) => write!(f, "stat {}", path.display()),
            Call::Rmdir { path, .. } => write!(f, "rmdir {}", path.display()),
            Call::Copydir { from, to, .. } => {
                write!(f, "cpdir {} -> {}", from.display(), to.display())
            }
            Call::Download { dest, content } => {
                write!(f, "download {} ({} bytes)", dest.display(), content.len())
            }
        }
    }
}

/// An expected call and its scripted result.
#[derive(Debug)]
pub struct Expect {
    call: Call,
    output: CommandOutput,
    exists: bool,
    error: Option<RunnerError>,
}

impl Expect {
    fn new(call: Call) -> Self {
        Self {
            call,
            output: CommandOutput::default(),
            exists: false,
            error: None,
        }
    }

    /// A command run in `workdir`; exits 0 with no output unless scripted.
    pub fn shell<I, S>(workdir: impl Into<PathBuf>, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Call::Shell(ShellCommand::new(workdir, argv)))
    }

    /// A stat; reports absent unless [`Expect::exists`] says otherwise.
    pub fn stat(path: impl Into<PathBuf>) -> Self {
        Self::new(Call::Stat(path.into()))
    }

    pub fn rmdir(path: impl Into<PathBuf>) -> Self {
        Self::new(Call::Rmdir {
            path: path.into(),
            timeout: None,
        })
    }

    pub fn copydir(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self::new(Call::Copydir {
            from: from.into(),
            to: to.into(),
            timeout: None,
        })
    }

    pub fn download(dest: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        Self::new(Call::Download {
            dest: dest.into(),
            content: content.into(),
        })
    }

    /// Expected timeout hint of an rmdir, copydir or shell call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        match &mut self.call {
            Call::Shell(cmd) => cmd.timeout = Some(timeout),
            Call::Rmdir { timeout: t, .. } | Call::Copydir { timeout: t, .. } => {
                *t = Some(timeout)
            }
            Call::Stat(_) | Call::Download { .. } => {}
        }
        self
    }

    pub fn exit(mut self, code: i32) -> Self {
        self.output.exit_code = code;
        self
    }

    pub fn stdout(mut self, text: impl Into<String>) -> Self {
        self.output.stdout = text.into();
        self
    }

    pub fn stderr(mut self, text: impl Into<String>) -> Self {
        self.output.stderr = text.into();
        self
    }

    pub fn exists(mut self, exists: bool) -> Self {
        self.exists = exists;
        self
    }

    /// Fail the call as if the execution hop dropped.
    pub fn connection_lost(self) -> Self {
        self.error(RunnerError::ConnectionLost("scripted connection loss".into()))
    }

    pub fn error(mut self, error: RunnerError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Replays a fixed script of [`Expect`]ations.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Expect>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedRunner {
    pub fn new(script: impl IntoIterator<Item = Expect>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Append more expectations, e.g. for a second run.
    pub fn extend(&self, more: impl IntoIterator<Item = Expect>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(more);
    }

    /// Expectations not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// How many calls so far matched `pred`.
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Panic unless the whole script was consumed.
    pub fn assert_done(&self) {
        let script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = script.front() {
            panic!(
                "{} scripted call(s) never made; next expected: {}",
                script.len(),
                next.call
            );
        }
    }

    fn take(&self, call: Call) -> Expect {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call.clone());
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(expect) if expect.call == call => expect,
            Some(expect) => panic!("unexpected call\n  expected: {}\n  actual:   {call}", expect.call),
            None => panic!("unexpected call after end of script: {call}"),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, RunnerError> {
        let expect = self.take(Call::Shell(command.clone()));
        match expect.error {
            Some(err) => Err(err),
            None => Ok(expect.output),
        }
    }

    async fn stat(&self, path: &Path) -> Result<bool, RunnerError> {
        let expect = self.take(Call::Stat(path.to_path_buf()));
        match expect.error {
            Some(err) => Err(err),
            None => Ok(expect.exists),
        }
    }

    async fn rmdir(&self, path: &Path, timeout: Option<Duration>) -> Result<(), RunnerError> {
        let expect = self.take(Call::Rmdir {
            path: path.to_path_buf(),
            timeout,
        });
        expect.error.map_or(Ok(()), Err)
    }

    async fn copydir(
        &self,
        from: &Path,
        to: &Path,
        timeout: Option<Duration>,
    ) -> Result<(), RunnerError> {
        let expect = self.take(Call::Copydir {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            timeout,
        });
        expect.error.map_or(Ok(()), Err)
    }

    async fn download_file(&self, dest: &Path, content: &[u8]) -> Result<(), RunnerError> {
        let expect = self.take(Call::Download {
            dest: dest.to_path_buf(),
            content: content.to_vec(),
        });
        expect.error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_results_in_order() {
        let runner = ScriptedRunner::new([
            Expect::shell("wkdir", ["darcs", "--version"]).stdout("2.8.4\n"),
            Expect::stat("wkdir/_darcs").exists(true),
        ]);
        let out = runner
            .run(&ShellCommand::new("wkdir", ["darcs", "--version"]))
            .await
            .expect("run");
        assert_eq!(out.stdout, "2.8.4\n");
        assert!(runner.stat(Path::new("wkdir/_darcs")).await.expect("stat"));
        runner.assert_done();
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn scripted_errors_are_returned() {
        let runner = ScriptedRunner::new([Expect::rmdir("wkdir").connection_lost()]);
        let err = runner.rmdir(Path::new("wkdir"), None).await.unwrap_err();
        assert!(err.is_connection_lost());
    }

    #[tokio::test]
    #[should_panic(expected = "unexpected call")]
    async fn mismatched_call_panics() {
        let runner = ScriptedRunner::new([Expect::stat("wkdir")]);
        let _ = runner.rmdir(Path::new("wkdir"), None).await;
    }

    #[test]
    #[should_panic(expected = "never made")]
    fn unconsumed_script_panics() {
        ScriptedRunner::new([Expect::stat("wkdir")]).assert_done();
    }
}
