//! # OS Primitive Layer
//!
//! Every external command the engine runs (`systemctl`, `useradd`,
//! `chpasswd`, `who`, ...) goes through a [`SystemRunner`]. Production uses
//! [`ProcessRunner`]; tests inject a scripted fake.
//!
//! ## Outcome Classification
//! ```text
//! ┌──────────────────────────┬──────────────────────────────────────────┐
//! │ What happened            │ CommandOutcome                           │
//! ├──────────────────────────┼──────────────────────────────────────────┤
//! │ exit status 0            │ Success { stdout }                       │
//! │ exit status != 0         │ Failed { status, stderr }                │
//! │ deadline passed          │ TimedOut (child is killed)               │
//! │ program not installed    │ Unavailable { reason }                   │
//! └──────────────────────────┴──────────────────────────────────────────┘
//! ```

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

/// One external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Written to the child's stdin, then stdin is closed
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// `systemctl <verb> <unit>`
    pub fn systemctl(verb: &str, unit: &str) -> Self {
        CommandSpec::new("systemctl", [verb, unit])
    }
}

impl fmt::Display for CommandSpec {
    /// Program and arguments. Stdin is never shown, it may carry a password.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Distinguishable result of running a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Success { stdout: String },
    Failed { status: Option<i32>, stderr: String },
    TimedOut,
    Unavailable { reason: String },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success { .. })
    }

    /// Exit status of a failed command.
    pub fn status(&self) -> Option<i32> {
        match self {
            CommandOutcome::Success { .. } => Some(0),
            CommandOutcome::Failed { status, .. } => *status,
            _ => None,
        }
    }
}

/// Runs external commands with a bounded timeout.
#[async_trait]
pub trait SystemRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> CommandOutcome;
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl SystemRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> CommandOutcome {
        debug!(command = %spec, "Running command");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CommandOutcome::Unavailable {
                    reason: format!("{} not found", spec.program),
                }
            }
            Err(e) => {
                return CommandOutcome::Unavailable {
                    reason: e.to_string(),
                }
            }
        };

        if let (Some(input), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                return CommandOutcome::Failed {
                    status: None,
                    stderr: format!("failed to write stdin: {}", e),
                };
            }
            // Dropping stdin closes the pipe so the child sees EOF
            drop(stdin);
        }

        // kill_on_drop reaps the child if the deadline passes first
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => CommandOutcome::TimedOut,
            Ok(Err(e)) => CommandOutcome::Failed {
                status: None,
                stderr: e.to_string(),
            },
            Ok(Ok(output)) => {
                trace!(command = %spec, status = ?output.status.code(), "Command finished");
                if output.status.success() {
                    CommandOutcome::Success {
                        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    }
                } else {
                    CommandOutcome::Failed {
                        status: output.status.code(),
                        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    }
                }
            }
        }
    }
}
