//! Test support utilities shared across unit and integration tests.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::HuaweiConfig;
use crate::exec::{CommandEnv, CommandFuture, CommandOutput, CommandRunner, ExecError};
use crate::remote::SshConfig;

mod fake_cloud;
mod fake_remote;

pub use fake_cloud::{DeletePlan, EipDeletePlan, FakeCloud, ServerPlan};
pub use fake_remote::{FakeExecutor, RemoteCall};

/// Locks `mutex`, recovering the data if a panicking test poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// Responses are consumed in call order, so only sequential callers should
/// share one runner.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Extra environment variables passed to the program.
    pub env: Vec<(OsString, OsString)>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns `true` when any argument equals `expected`.
    #[must_use]
    pub fn has_arg(&self, expected: &str) -> bool {
        self.args.iter().any(|arg| arg == expected)
    }

    /// Returns the value of the environment variable `key`, if it was set.
    #[must_use]
    pub fn env_var(&self, key: &str) -> Option<String> {
        self.env
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.to_string_lossy().into_owned())
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a successful exit status with the given stdout.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run_with_env<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        env: &'a CommandEnv,
    ) -> CommandFuture<'a> {
        Box::pin(async move {
            lock(&self.invocations).push(CommandInvocation {
                program: program.to_owned(),
                args: args.to_vec(),
                env: env.to_vec(),
            });
            lock(&self.responses)
                .pop_front()
                .ok_or_else(|| ExecError::Spawn {
                    program: program.to_owned(),
                    message: String::from("no scripted response available"),
                })
        })
    }
}

/// Returns a valid Huawei Cloud configuration with placeholder credentials.
#[must_use]
pub fn huawei_config() -> HuaweiConfig {
    HuaweiConfig {
        access_key: String::from("HWCACCESSKEYEXAMPLE"),
        secret_key: String::from("HWCSECRETKEYEXAMPLE"),
        region: String::from("ap-southeast-3"),
        project_id: None,
        hcloud_bin: String::from("hcloud"),
    }
}

/// Returns an SSH configuration matching the documented defaults.
#[must_use]
pub fn ssh_config() -> SshConfig {
    SshConfig {
        ssh_bin: String::from("ssh"),
        scp_bin: String::from("scp"),
        ssh_keygen_bin: String::from("ssh-keygen"),
        ssh_user: String::from("root"),
        ssh_port: 22,
        ssh_batch_mode: true,
        ssh_strict_host_key_checking: false,
        ssh_known_hosts_file: String::from("/dev/null"),
        connect_timeout_secs: 10,
        local_key_path: String::from("~/.ssh/cluster_key"),
        remote_key_name: String::from("cluster_key"),
    }
}
