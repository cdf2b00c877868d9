//! Asynchronous process execution shared by the cloud client and the SSH
//! executor.
//!
//! Every external tool the crate drives (`hcloud`, `ssh`, `scp`,
//! `ssh-keygen`) is reached through [`CommandRunner`] so tests can swap in a
//! scripted runner instead of spawning processes.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;

mod util;

pub use util::expand_tilde;

/// Boxed future returned by [`CommandRunner::run`].
pub type CommandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, ExecError>> + Send + 'a>>;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Renders the exit code for log and error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Environment variables added to a child process, on top of the inherited
/// environment.
pub type CommandEnv = [(OsString, OsString)];

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with the given arguments and extra environment
    /// variables, capturing stdout and stderr. Secrets belong in `env` so
    /// they never show up in the process list.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Spawn`] if the command cannot be started.
    fn run_with_env<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        env: &'a CommandEnv,
    ) -> CommandFuture<'a>;

    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Spawn`] if the command cannot be started.
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a> {
        self.run_with_env(program, args, &[])
    }
}

/// Real command runner that spawns child processes through `tokio`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run_with_env<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        env: &'a CommandEnv,
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            let output = Command::new(program)
                .args(args)
                .envs(env.iter().map(|(key, value)| (key, value)))
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|err| ExecError::Spawn {
                    program: program.to_owned(),
                    message: err.to_string(),
                })?;

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// Errors surfaced while executing local or remote commands.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ExecError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a command completes with a non-zero exit code.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Command name used for the attempted operation.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
    /// Raised when the SSH client could not reach the remote host.
    #[error("host {host} is unreachable: {stderr}")]
    Unreachable {
        /// Host the client attempted to connect to.
        host: String,
        /// Stderr captured from the SSH client.
        stderr: String,
    },
}

impl ExecError {
    /// Builds a [`ExecError::CommandFailure`] from a captured output.
    #[must_use]
    pub fn failure(program: &str, output: CommandOutput) -> Self {
        let status_text = output.status_text();
        let CommandOutput { code, stderr, .. } = output;
        Self::CommandFailure {
            program: program.to_owned(),
            status: code,
            status_text,
            stderr: stderr.trim().to_owned(),
        }
    }
}
