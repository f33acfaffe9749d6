//! Blocking subprocess execution with a hard timeout.
//!
//! A private current-thread tokio runtime drives the child so the wait can be
//! bounded; the child is killed when the timeout drops it.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Default timeout for external tools, in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed { code: Option<i32>, stdout: String, stderr: String },
    TimedOut,
    SpawnFailed(String),
}

impl CommandOutcome {
    /// Stdout of a zero-exit run.
    pub fn success_stdout(&self) -> Option<&str> {
        match self {
            CommandOutcome::Completed { code: Some(0), stdout, .. } => Some(stdout),
            _ => None,
        }
    }
}

pub fn run_with_timeout(spec: &CommandSpec) -> CommandOutcome {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => return CommandOutcome::SpawnFailed(format!("failed to start runtime: {e}")),
    };
    debug!(
        program = %spec.program.display(),
        timeout_secs = spec.timeout.as_secs(),
        "running external command"
    );

    runtime.block_on(async {
        let mut command = tokio::process::Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return CommandOutcome::SpawnFailed(format!(
                    "failed to spawn {}: {e}",
                    spec.program.display()
                ))
            }
        };

        let pipe = child.stdin.take();
        let input = spec.stdin.clone();
        let feed = async move {
            if let (Some(mut pipe), Some(data)) = (pipe, input) {
                if let Err(e) = pipe.write_all(&data).await {
                    debug!(error = %e, "child closed stdin early");
                }
            }
        };
        let run = async {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        match tokio::time::timeout(spec.timeout, run).await {
            Ok(Ok(output)) => CommandOutcome::Completed {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Ok(Err(e)) => CommandOutcome::SpawnFailed(format!("failed to wait for child: {e}")),
            Err(_) => {
                warn!(program = %spec.program.display(), "external command timed out");
                CommandOutcome::TimedOut
            }
        }
    })
}
