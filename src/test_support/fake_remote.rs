//! In-memory [`RemoteExecutor`] keyed by host.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use camino::Utf8Path;

use crate::exec::ExecError;
use crate::remote::{RemoteCommandOutput, RemoteExecutor, RemoteFuture, SshTarget};

use super::lock;

/// Call recorded by [`FakeExecutor`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RemoteCall {
    /// A remote command.
    Run {
        /// Target host.
        host: String,
        /// Command text.
        command: String,
    },
    /// A file upload.
    Upload {
        /// Target host.
        host: String,
        /// Local source path.
        local: String,
        /// Remote destination path.
        remote: String,
    },
    /// A file download.
    Download {
        /// Source host.
        host: String,
        /// Remote source path.
        remote: String,
        /// Local destination path.
        local: String,
    },
}

impl RemoteCall {
    /// Host the call targeted.
    #[must_use]
    pub fn host(&self) -> &str {
        match self {
            Self::Run { host, .. } | Self::Upload { host, .. } | Self::Download { host, .. } => {
                host
            }
        }
    }
}

#[derive(Debug, Default)]
struct FakeExecutorState {
    unreachable: BTreeSet<String>,
    flaky: BTreeMap<String, u32>,
    failing: Vec<(String, String)>,
    stdout: BTreeMap<(String, String), String>,
    calls: Vec<RemoteCall>,
}

/// Fake executor whose hosts succeed unless scripted otherwise.
#[derive(Clone, Debug, Default)]
pub struct FakeExecutor {
    state: Arc<Mutex<FakeExecutorState>>,
}

impl FakeExecutor {
    /// Creates an executor where every host accepts every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `host` refuse every connection.
    #[must_use]
    pub fn with_unreachable(self, host: &str) -> Self {
        lock(&self.state).unreachable.insert(host.to_owned());
        self
    }

    /// Makes the first `failures` connections to `host` fail.
    #[must_use]
    pub fn with_flaky(self, host: &str, failures: u32) -> Self {
        lock(&self.state).flaky.insert(host.to_owned(), failures);
        self
    }

    /// Makes commands on `host` containing `needle` exit with status 1.
    #[must_use]
    pub fn with_failing_command(self, host: &str, needle: &str) -> Self {
        lock(&self.state)
            .failing
            .push((host.to_owned(), needle.to_owned()));
        self
    }

    /// Returns `stdout` for the exact `command` on `host`.
    #[must_use]
    pub fn with_stdout(self, host: &str, command: &str, stdout: &str) -> Self {
        lock(&self.state)
            .stdout
            .insert((host.to_owned(), command.to_owned()), stdout.to_owned());
        self
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.state).calls.clone()
    }

    /// Calls made against `host`, in order.
    #[must_use]
    pub fn calls_for(&self, host: &str) -> Vec<RemoteCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.host() == host)
            .collect()
    }

    /// Commands run on `host`, in order.
    #[must_use]
    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.calls_for(host)
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::Run { command, .. } => Some(command),
                _ => None,
            })
            .collect()
    }

    fn connect(&self, host: &str, call: RemoteCall) -> Result<(), ExecError> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        if state.unreachable.contains(host) {
            return Err(unreachable(host));
        }
        if let Some(remaining) = state.flaky.get_mut(host)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(unreachable(host));
        }
        Ok(())
    }
}

fn unreachable(host: &str) -> ExecError {
    ExecError::Unreachable {
        host: host.to_owned(),
        stderr: String::from("ssh: connect to host: Connection refused"),
    }
}

impl RemoteExecutor for FakeExecutor {
    fn run<'a>(
        &'a self,
        target: &'a SshTarget,
        command: &'a str,
    ) -> RemoteFuture<'a, RemoteCommandOutput> {
        Box::pin(async move {
            self.connect(
                &target.host,
                RemoteCall::Run {
                    host: target.host.clone(),
                    command: command.to_owned(),
                },
            )?;
            let state = lock(&self.state);
            let failing = state
                .failing
                .iter()
                .any(|(host, needle)| *host == target.host && command.contains(needle.as_str()));
            if failing {
                return Ok(RemoteCommandOutput {
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: String::from("simulated failure"),
                });
            }
            let stdout = state
                .stdout
                .get(&(target.host.clone(), command.to_owned()))
                .cloned()
                .unwrap_or_default();
            Ok(RemoteCommandOutput {
                exit_code: Some(0),
                stdout,
                stderr: String::new(),
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
            self.connect(
                &target.host,
                RemoteCall::Upload {
                    host: target.host.clone(),
                    local: local.to_string(),
                    remote: remote.to_owned(),
                },
            )
        })
    }

    fn download<'a>(
        &'a self,
        target: &'a SshTarget,
        remote: &'a str,
        local: &'a Utf8Path,
    ) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            self.connect(
                &target.host,
                RemoteCall::Download {
                    host: target.host.clone(),
                    remote: remote.to_owned(),
                    local: local.to_string(),
                },
            )
        })
    }
}
