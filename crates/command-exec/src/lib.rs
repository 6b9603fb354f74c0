//! Bounded-time shell execution for approved action intents.
//!
//! Commands run through the platform shell so pipes and redirection work,
//! stream both output channels incrementally, and are force-killed when
//! they exceed their deadline. A timeout is a distinct failure from a
//! non-zero exit; both carry the captured streams.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Which output channel a streamed chunk came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Incremental output callback. Invoked once per line as the subprocess
/// produces it.
pub type OutputSink = Arc<dyn Fn(StreamKind, &str) + Send + Sync>;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("command exited with status {code:?}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    Failed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

/// Options for one command run.
#[derive(Clone)]
pub struct RunOptions {
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    pub on_output: Option<OutputSink>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            timeout: Duration::from_secs(60),
            on_output: None,
        }
    }
}

impl RunOptions {
    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_output_sink(mut self, sink: OutputSink) -> Self {
        self.on_output = Some(sink);
        self
    }
}

/// Shell subprocess runner.
#[derive(Clone, Default)]
pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `cmd` through the shell and return captured stdout.
    ///
    /// On timeout the process is killed and `CommandError::Timeout` is
    /// returned. A non-zero exit yields `CommandError::Failed` with both
    /// captured streams.
    pub async fn run(&self, cmd: &str, opts: RunOptions) -> Result<String, CommandError> {
        debug!(cmd, timeout = ?opts.timeout, "spawning shell command");

        let mut command = shell_command(cmd);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        if let Some(cwd) = &opts.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(pump(stdout, StreamKind::Stdout, opts.on_output.clone()));
        let stderr_task = tokio::spawn(pump(stderr, StreamKind::Stderr, opts.on_output.clone()));

        let status = match tokio::time::timeout(opts.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(cmd, "command deadline exceeded, killing subprocess");
                let _ = child.start_kill();
                let _ = child.wait().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(CommandError::Timeout(opts.timeout));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(CommandError::Failed {
                code: status.code(),
                stdout,
                stderr,
            });
        }

        Ok(stdout)
    }
}

fn shell_command(cmd: &str) -> Command {
    #[cfg(target_os = "windows")]
    {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(cmd);
        command
    }
    #[cfg(not(target_os = "windows"))]
    {
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd);
        command
    }
}

async fn pump<R>(reader: Option<R>, kind: StreamKind, sink: Option<OutputSink>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut collected = String::new();
    let Some(reader) = reader else {
        return collected;
    };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(sink) = &sink {
            sink(kind, &line);
        }
        collected.push_str(&line);
        collected.push('\n');
    }
    collected
}
