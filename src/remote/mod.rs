//! Remote command execution and file transfer over the system SSH client.
//!
//! [`RemoteExecutor`] is the seam the trust configurator and the task runner
//! use; [`SshExecutor`] implements it by shelling out to `ssh` and `scp`.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::config::ConfigError;
use crate::exec::{CommandOutput, CommandRunner, ExecError, ProcessCommandRunner, expand_tilde};

mod config;

pub use config::{DEFAULT_LOCAL_KEY_PATH, DEFAULT_REMOTE_KEY_NAME, SshConfig};

/// Exit status the OpenSSH client reserves for its own connection errors.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Future returned by remote executor operations.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ExecError>> + Send + 'a>>;

/// Host plus the key used to authenticate against it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshTarget {
    /// Address or resolvable name of the host.
    pub host: String,
    /// Private key passed with `-i`; `None` lets the client pick defaults.
    pub identity_file: Option<Utf8PathBuf>,
}

impl SshTarget {
    /// Creates a target.
    #[must_use]
    pub fn new(host: impl Into<String>, identity_file: Option<&Utf8Path>) -> Self {
        Self {
            host: host.into(),
            identity_file: identity_file.map(Utf8Path::to_path_buf),
        }
    }
}

/// Output captured from a remote command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteCommandOutput {
    /// Exit code reported by the remote command, if any.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl RemoteCommandOutput {
    /// Returns `true` when the remote command exited with status zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Runs commands and copies files on remote hosts.
pub trait RemoteExecutor: Send + Sync {
    /// Runs `command` through the remote login shell.
    ///
    /// Non-zero remote exit codes are reported in the output, not as errors.
    fn run<'a>(
        &'a self,
        target: &'a SshTarget,
        command: &'a str,
    ) -> RemoteFuture<'a, RemoteCommandOutput>;

    /// Copies the local file at `local` to `remote` on the target.
    fn upload<'a>(
        &'a self,
        target: &'a SshTarget,
        local: &'a Utf8Path,
        remote: &'a str,
    ) -> RemoteFuture<'a, ()>;

    /// Copies `remote` from the target to the local path `local`.
    fn download<'a>(
        &'a self,
        target: &'a SshTarget,
        remote: &'a str,
        local: &'a Utf8Path,
    ) -> RemoteFuture<'a, ()>;
}

/// [`RemoteExecutor`] driving the system `ssh` and `scp` binaries.
#[derive(Clone, Debug)]
pub struct SshExecutor<R: CommandRunner> {
    config: SshConfig,
    runner: R,
}

impl SshExecutor<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when validation fails.
    pub fn with_process_runner(config: SshConfig) -> Result<Self, ConfigError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshExecutor<R> {
    /// Creates an executor using the provided configuration and runner.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when configuration validation
    /// fails.
    pub fn new(config: SshConfig, runner: R) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    fn build_ssh_args(&self, target: &SshTarget, command: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.config.ssh_port.to_string()),
        ];
        args.extend(self.common_ssh_options(target));
        args.push(OsString::from(self.destination(target)));
        args.push(OsString::from(command));
        args
    }

    fn build_scp_args(&self, target: &SshTarget, from: String, to: String) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-q"),
            OsString::from("-P"),
            OsString::from(self.config.ssh_port.to_string()),
        ];
        args.extend(self.common_ssh_options(target));
        args.push(OsString::from(from));
        args.push(OsString::from(to));
        args
    }

    fn common_ssh_options(&self, target: &SshTarget) -> Vec<OsString> {
        let mut args = Vec::new();

        if let Some(identity_file) = &target.identity_file {
            args.push(OsString::from("-i"));
            args.push(OsString::from(expand_tilde(identity_file.as_str())));
        }

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        if self.config.connect_timeout_secs > 0 {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "ConnectTimeout={}",
                self.config.connect_timeout_secs
            )));
        }

        args
    }

    fn destination(&self, target: &SshTarget) -> String {
        format!("{}@{}", self.config.ssh_user, target.host)
    }

    async fn copy(
        &self,
        target: &SshTarget,
        from: String,
        to: String,
    ) -> Result<(), ExecError> {
        let args = self.build_scp_args(target, from, to);
        let output = self.runner.run(&self.config.scp_bin, &args).await?;
        if output.is_success() {
            return Ok(());
        }
        Err(self.transfer_error(target, output))
    }

    fn transfer_error(&self, target: &SshTarget, output: CommandOutput) -> ExecError {
        if output.code == Some(SSH_CONNECTION_FAILURE) {
            return ExecError::Unreachable {
                host: target.host.clone(),
                stderr: output.stderr.trim().to_owned(),
            };
        }
        ExecError::failure(&self.config.scp_bin, output)
    }
}

impl<R: CommandRunner> RemoteExecutor for SshExecutor<R> {
    fn run<'a>(
        &'a self,
        target: &'a SshTarget,
        command: &'a str,
    ) -> RemoteFuture<'a, RemoteCommandOutput> {
        Box::pin(async move {
            debug!(host = %target.host, "running remote command");
            let args = self.build_ssh_args(target, command);
            let output = self.runner.run(&self.config.ssh_bin, &args).await?;
            if output.code == Some(SSH_CONNECTION_FAILURE) {
                return Err(ExecError::Unreachable {
                    host: target.host.clone(),
                    stderr: output.stderr.trim().to_owned(),
                });
            }
            Ok(RemoteCommandOutput {
                exit_code: output.code,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        })
    }

    fn upload<'a>(
        &'a self,
        target: &'a SshTarget,
        local: &'a Utf8Path,
        remote: &'a str,
    ) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let to = format!("{}:{remote}", self.destination(target));
            self.copy(target, local.to_string(), to).await
        })
    }

    fn download<'a>(
        &'a self,
        target: &'a SshTarget,
        remote: &'a str,
        local: &'a Utf8Path,
    ) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let from = format!("{}:{remote}", self.destination(target));
            self.copy(target, from, local.to_string()).await
        })
    }
}

#[cfg(test)]
mod tests;
