//! [`CommandRunner`] backed by the local machine, optionally through an
//! ssh execution hop.
//!
//! Paths are resolved against `base_dir`. Without a hop, commands are
//! spawned with `tokio::process` and filesystem operations use `tokio::fs`.
//! With a hop every call becomes `ssh <hop> sh -c '<script>'` and the same
//! paths are interpreted on the remote host.
//!
//! A command's working directory is created if it does not exist yet, and
//! removed again afterwards if the command left it empty, so a later clone
//! can still target it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{io_err, RunnerError};
use crate::runner::{CommandOutput, CommandRunner, ShellCommand};

/// Exit status ssh reserves for its own failures.
const SSH_CONNECTION_ERROR: i32 = 255;

#[derive(Debug, Clone)]
pub struct LocalRunner {
    base_dir: PathBuf,
    hop: Option<String>,
    default_timeout: Option<Duration>,
}

impl LocalRunner {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            hop: None,
            default_timeout: None,
        }
    }

    /// Issue everything over ssh to `hop` (`user@host` or an ssh config alias).
    pub fn with_hop(mut self, hop: impl Into<String>) -> Self {
        self.hop = Some(hop.into());
        self
    }

    /// Applied to commands that carry no timeout of their own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn hop(&self) -> Option<&str> {
        self.hop.as_deref()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    fn ssh(hop: &str, script: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg(hop)
            .arg(format!("sh -c {}", quote(script)));
        cmd
    }

    /// Run `script` on the hop and return its raw output.
    async fn remote(
        &self,
        hop: &str,
        script: &str,
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, RunnerError> {
        let output = spawn(Self::ssh(hop, script), "ssh", stdin, timeout).await?;
        if output.exit_code == SSH_CONNECTION_ERROR {
            let detail = output.last_line().unwrap_or("no output").to_string();
            return Err(RunnerError::ConnectionLost(format!("ssh {hop}: {detail}")));
        }
        Ok(output)
    }

    /// Run a filesystem script remotely and turn a non-zero exit into an error.
    async fn remote_fs(
        &self,
        hop: &str,
        op: &'static str,
        script: &str,
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<(), RunnerError> {
        let output = self.remote(hop, script, stdin, timeout).await?;
        if output.success() {
            Ok(())
        } else {
            Err(RunnerError::Rejected {
                op,
                message: output
                    .last_line()
                    .unwrap_or("non-zero exit")
                    .to_string(),
            })
        }
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, RunnerError> {
        let workdir = self.resolve(&command.workdir);
        let timeout = command.timeout.or(self.default_timeout);
        tracing::debug!(command = %command, workdir = %workdir.display(), "running");

        match &self.hop {
            Some(hop) => {
                let dir = quote(&workdir.display().to_string());
                let argv = command
                    .argv
                    .iter()
                    .map(|a| quote(a))
                    .collect::<Vec<_>>()
                    .join(" ");
                let script = format!(
                    "if [ -d {dir} ]; then cd {dir} && exec {argv}; fi; \
                     mkdir -p {dir} && (cd {dir} && exec {argv}); status=$?; \
                     rmdir {dir} 2>/dev/null; exit $status"
                );
                self.remote(hop, &script, None, timeout).await
            }
            None => {
                let (program, args) = command.argv.split_first().ok_or(RunnerError::Rejected {
                    op: "run",
                    message: "empty command line".to_string(),
                })?;
                let created = !tokio::fs::try_exists(&workdir)
                    .await
                    .map_err(|e| io_err(&workdir, e))?;
                if created {
                    tokio::fs::create_dir_all(&workdir)
                        .await
                        .map_err(|e| io_err(&workdir, e))?;
                }
                let mut cmd = Command::new(program);
                cmd.args(args).current_dir(&workdir);
                let output = spawn(cmd, program, None, timeout).await;
                if created {
                    // Fails, and keeps the directory, once anything was written.
                    tokio::fs::remove_dir(&workdir).await.ok();
                }
                output
            }
        }
    }

    async fn stat(&self, path: &Path) -> Result<bool, RunnerError> {
        let path = self.resolve(path);
        match &self.hop {
            Some(hop) => {
                let script = format!("test -e {}", quote(&path.display().to_string()));
                let output = self.remote(hop, &script, None, self.default_timeout).await?;
                Ok(output.success())
            }
            None => tokio::fs::try_exists(&path)
                .await
                .map_err(|e| io_err(&path, e)),
        }
    }

    async fn rmdir(&self, path: &Path, timeout: Option<Duration>) -> Result<(), RunnerError> {
        let path = self.resolve(path);
        match &self.hop {
            Some(hop) => {
                let script = format!("rm -rf {}", quote(&path.display().to_string()));
                self.remote_fs(hop, "rmdir", &script, None, timeout).await
            }
            None => with_timeout("rmdir", timeout, remove_path(&path)).await,
        }
    }

    async fn copydir(
        &self,
        from: &Path,
        to: &Path,
        timeout: Option<Duration>,
    ) -> Result<(), RunnerError> {
        let from = self.resolve(from);
        let to = self.resolve(to);
        match &self.hop {
            Some(hop) => {
                let script = format!(
                    "cp -R {} {}",
                    quote(&from.display().to_string()),
                    quote(&to.display().to_string())
                );
                self.remote_fs(hop, "copydir", &script, None, timeout).await
            }
            None => {
                let task = tokio::task::spawn_blocking(move || copy_tree(&from, &to));
                with_timeout("copydir", timeout, async {
                    task.await.unwrap_or_else(|e| {
                        Err(RunnerError::Rejected {
                            op: "copydir",
                            message: e.to_string(),
                        })
                    })
                })
                .await
            }
        }
    }

    async fn download_file(&self, dest: &Path, content: &[u8]) -> Result<(), RunnerError> {
        let dest = self.resolve(dest);
        match &self.hop {
            Some(hop) => {
                let target = quote(&dest.display().to_string());
                let script = match dest.parent() {
                    Some(parent) => format!(
                        "mkdir -p {} && cat > {target}",
                        quote(&parent.display().to_string())
                    ),
                    None => format!("cat > {target}"),
                };
                self.remote_fs(hop, "download", &script, Some(content), self.default_timeout)
                    .await
            }
            None => {
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| io_err(parent, e))?;
                }
                tokio::fs::write(&dest, content)
                    .await
                    .map_err(|e| io_err(&dest, e))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

async fn spawn(
    mut cmd: Command,
    program: &str,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
) -> Result<CommandOutput, RunnerError> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let spawn_err = |source| RunnerError::Spawn {
        program: program.to_string(),
        source,
    };
    let mut child = cmd.spawn().map_err(spawn_err)?;
    if let (Some(bytes), Some(mut sink)) = (stdin, child.stdin.take()) {
        sink.write_all(bytes).await.map_err(spawn_err)?;
    }

    let output = with_timeout(program, timeout, async {
        child.wait_with_output().await.map_err(spawn_err)
    })
    .await?;

    Ok(CommandOutput {
        // Killed by a signal: no exit code.
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

async fn with_timeout<T>(
    what: &str,
    timeout: Option<Duration>,
    fut: impl std::future::Future<Output = Result<T, RunnerError>>,
) -> Result<T, RunnerError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| RunnerError::Timeout {
                what: what.to_string(),
                timeout: limit,
            })?,
        None => fut.await,
    }
}

async fn remove_path(path: &Path) -> Result<(), RunnerError> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_err(path, e)),
    };
    let removed = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    removed.map_err(|e| io_err(path, e))
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), RunnerError> {
    std::fs::create_dir_all(to).map_err(|e| io_err(to, e))?;
    for entry in std::fs::read_dir(from).map_err(|e| io_err(from, e))? {
        let entry = entry.map_err(|e| io_err(from, e))?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| io_err(&src, e))?;
        if file_type.is_dir() {
            copy_tree(&src, &dst)?;
        } else {
            std::fs::copy(&src, &dst).map_err(|e| io_err(&src, e))?;
        }
    }
    Ok(())
}

/// Quote `arg` for a POSIX shell. Plain words pass through unchanged.
pub fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
