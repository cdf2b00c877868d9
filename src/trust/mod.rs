//! Cluster-wide passwordless SSH and hostname resolution.
//!
//! [`TrustConfigurator`] connects to every node with a bootstrap key, maps
//! each cluster hostname to its private address in `/etc/hosts`, installs a
//! shared cluster key pair, authorises it, and writes a non-interactive SSH
//! client configuration. Afterwards any node can reach any other by
//! hostname without prompts.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::exec::ExecError;
use crate::orchestrator::InstanceHandle;
use crate::pool::fan_out;
use crate::remote::{RemoteCommandOutput, RemoteExecutor, SshTarget};
use crate::request::node_hostname;
use crate::retry::RetryPolicy;

mod keys;
mod remote_files;

pub use keys::{KeyPair, ensure_local_key_pair};
pub use remote_files::{merge_authorized_key, rewrite_hosts, ssh_client_config, write_file_command};

use remote_files::quote;

/// Upper bound on nodes configured concurrently.
pub const CONFIGURE_CONCURRENCY: usize = 5;

/// Peers checked from the first node by [`TrustConfigurator::verify_mesh`].
pub const MESH_CHECK_PEERS: usize = 2;

/// Node of a cluster as seen by the trust configurator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterNode {
    /// Cluster hostname (`node<index>-<task>`).
    pub hostname: String,
    /// Public address, when one is attached.
    pub public_ip: Option<String>,
    /// VPC address other nodes use.
    pub private_ip: String,
}

impl ClusterNode {
    /// Derives the node for an active instance of a `task_type` batch.
    #[must_use]
    pub fn from_handle(handle: &InstanceHandle, task_type: &str) -> Self {
        Self {
            hostname: node_hostname(handle.index, task_type),
            public_ip: handle.public_ip.clone(),
            private_ip: handle.private_ip.clone(),
        }
    }

    /// Address used to reach the node from outside the cluster: the public
    /// IP, falling back to the private one.
    #[must_use]
    pub fn connect_address(&self) -> &str {
        self.public_ip.as_deref().unwrap_or(&self.private_ip)
    }
}

/// Node that could not be configured.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeFailure {
    /// Cluster hostname.
    pub hostname: String,
    /// Final error after retries.
    pub reason: String,
}

/// Outcome of [`TrustConfigurator::configure_cluster`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TrustReport {
    /// Hostnames configured successfully, sorted.
    pub configured: Vec<String>,
    /// Nodes that failed, sorted by hostname.
    pub failed: Vec<NodeFailure>,
}

impl TrustReport {
    /// Returns `true` only when every node was configured.
    #[must_use]
    pub fn all_configured(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of probing intra-cluster SSH from the first node.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MeshCheck {
    /// Peers that answered.
    pub reachable: Vec<String>,
    /// Peers that did not.
    pub unreachable: Vec<String>,
}

/// Errors raised while configuring trust.
#[derive(Debug, Error)]
pub enum TrustError {
    /// A remote call could not be made.
    #[error("{step} on {host} failed: {source}")]
    Remote {
        /// Node address.
        host: String,
        /// Configuration step.
        step: &'static str,
        /// Underlying execution error.
        #[source]
        source: ExecError,
    },
    /// A remote command exited non-zero.
    #[error("{step} on {host} exited with status {status_text}: {stderr}")]
    Step {
        /// Node address.
        host: String,
        /// Configuration step.
        step: &'static str,
        /// Human readable exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// `ssh-keygen` could not create or read the key pair.
    #[error("key generation failed: {0}")]
    KeyGeneration(#[from] ExecError),
    /// A local key file could not be accessed.
    #[error("key file {path}: {message}")]
    KeyFile {
        /// Path of the key file.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}

/// Configures cluster trust through a [`RemoteExecutor`].
#[derive(Clone, Debug)]
pub struct TrustConfigurator<X: RemoteExecutor> {
    executor: X,
    remote_key_name: String,
    retry: RetryPolicy,
    manage_hosts: bool,
}

impl<X: RemoteExecutor> TrustConfigurator<X> {
    /// Creates a configurator that installs the cluster key as
    /// `~/.ssh/<remote_key_name>` and manages `/etc/hosts`.
    #[must_use]
    pub fn new(executor: X, remote_key_name: impl Into<String>) -> Self {
        Self {
            executor,
            remote_key_name: remote_key_name.into(),
            retry: RetryPolicy::node_configuration(),
            manage_hosts: true,
        }
    }

    /// Overrides the per-node retry policy.
    #[must_use]
    pub const fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Enables or disables the `/etc/hosts` rewrite; nodes addressed only by
    /// a bare host list have no private addresses to map.
    #[must_use]
    pub const fn with_hosts_file(mut self, manage_hosts: bool) -> Self {
        self.manage_hosts = manage_hosts;
        self
    }

    /// Returns the underlying executor.
    #[must_use]
    pub const fn executor(&self) -> &X {
        &self.executor
    }

    /// Configures a single node, retrying the whole sequence under the
    /// configured policy. Returns `true` on success.
    pub async fn configure_node(
        &self,
        node: &ClusterNode,
        bootstrap_key: &Utf8Path,
        cluster_key: &KeyPair,
        all_nodes: &[ClusterNode],
    ) -> bool {
        match self
            .configure_with_retry(node, bootstrap_key, cluster_key, all_nodes)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                error!(node = %node.hostname, error = %err, "node configuration failed");
                false
            }
        }
    }

    /// Configures every node concurrently. A failing node never aborts its
    /// siblings.
    pub async fn configure_cluster(
        &self,
        nodes: &[ClusterNode],
        bootstrap_key: &Utf8Path,
        cluster_key: &KeyPair,
    ) -> TrustReport {
        let results = fan_out(nodes, CONFIGURE_CONCURRENCY, |node| async move {
            let outcome = self
                .configure_with_retry(node, bootstrap_key, cluster_key, nodes)
                .await;
            (node.hostname.clone(), outcome)
        })
        .await;

        let mut report = TrustReport::default();
        for (hostname, outcome) in results {
            match outcome {
                Ok(()) => report.configured.push(hostname),
                Err(err) => {
                    error!(node = %hostname, error = %err, "node configuration failed");
                    report.failed.push(NodeFailure {
                        hostname,
                        reason: err.to_string(),
                    });
                }
            }
        }
        report.configured.sort();
        report
            .failed
            .sort_by(|left, right| left.hostname.cmp(&right.hostname));
        info!(
            "{}/{} nodes configured",
            report.configured.len(),
            nodes.len()
        );
        report
    }

    /// Checks SSH by hostname from the first node to up to
    /// [`MESH_CHECK_PEERS`] others, authenticating to the first node with
    /// `bootstrap_key`.
    pub async fn verify_mesh(&self, nodes: &[ClusterNode], bootstrap_key: &Utf8Path) -> MeshCheck {
        let mut check = MeshCheck::default();
        let Some((first, peers)) = nodes.split_first() else {
            return check;
        };
        let target = SshTarget::new(first.connect_address(), Some(bootstrap_key));
        for peer in peers.iter().take(MESH_CHECK_PEERS) {
            let command = format!("ssh -o BatchMode=yes {} hostname", quote(&peer.hostname));
            match self.executor.run(&target, &command).await {
                Ok(output) if output.is_success() => {
                    info!(from = %first.hostname, to = %peer.hostname, "mesh SSH ok");
                    check.reachable.push(peer.hostname.clone());
                }
                Ok(output) => {
                    warn!(from = %first.hostname, to = %peer.hostname, stderr = %output.stderr.trim(), "mesh SSH failed");
                    check.unreachable.push(peer.hostname.clone());
                }
                Err(err) => {
                    warn!(from = %first.hostname, to = %peer.hostname, error = %err, "mesh SSH failed");
                    check.unreachable.push(peer.hostname.clone());
                }
            }
        }
        check
    }

    async fn configure_with_retry(
        &self,
        node: &ClusterNode,
        bootstrap_key: &Utf8Path,
        cluster_key: &KeyPair,
        all_nodes: &[ClusterNode],
    ) -> Result<(), TrustError> {
        self.retry
            .run(&node.hostname, |_| {
                self.configure_node_once(node, bootstrap_key, cluster_key, all_nodes)
            })
            .await?;
        info!(node = %node.hostname, "node configured");
        Ok(())
    }

    async fn configure_node_once(
        &self,
        node: &ClusterNode,
        bootstrap_key: &Utf8Path,
        cluster_key: &KeyPair,
        all_nodes: &[ClusterNode],
    ) -> Result<(), TrustError> {
        let target = SshTarget::new(node.connect_address(), Some(bootstrap_key));
        self.check(&target, "true", "connectivity check").await?;

        if self.manage_hosts {
            let hosts = self.check(&target, "cat /etc/hosts", "read /etc/hosts").await?;
            let updated = rewrite_hosts(&hosts.stdout, all_nodes);
            self.check(
                &target,
                &write_file_command("/etc/hosts", &updated, None, true),
                "write /etc/hosts",
            )
            .await?;
        }

        self.check(&target, "mkdir -p ~/.ssh && chmod 700 ~/.ssh", "prepare ~/.ssh")
            .await?;
        let key_path = format!(".ssh/{}", self.remote_key_name);
        self.install_file(&target, &cluster_key.private_key_path, &key_path, "600")
            .await?;
        self.install_file(
            &target,
            &cluster_key.public_key_path(),
            &format!("{key_path}.pub"),
            "644",
        )
        .await?;

        let existing = self
            .check(
                &target,
                "cat .ssh/authorized_keys 2>/dev/null || true",
                "read authorized_keys",
            )
            .await?;
        let authorize = merge_authorized_key(&existing.stdout, &cluster_key.public_key).map_or_else(
            || String::from("chmod 600 .ssh/authorized_keys"),
            |updated| write_file_command(".ssh/authorized_keys", &updated, Some("600"), false),
        );
        self.check(&target, &authorize, "authorize cluster key").await?;

        self.check(
            &target,
            &write_file_command(
                ".ssh/config",
                &ssh_client_config(&self.remote_key_name),
                Some("600"),
                false,
            ),
            "write ~/.ssh/config",
        )
        .await?;
        Ok(())
    }

    async fn install_file(
        &self,
        target: &SshTarget,
        local: &Utf8Path,
        destination: &str,
        mode: &str,
    ) -> Result<(), TrustError> {
        let staging = format!("/tmp/ecsfleet-{}", Uuid::new_v4());
        self.executor
            .upload(target, local, &staging)
            .await
            .map_err(|source| TrustError::Remote {
                host: target.host.clone(),
                step: "upload key",
                source,
            })?;
        let command = format!(
            "mv {staged} {dest} && chmod {mode} {dest}",
            staged = quote(&staging),
            dest = quote(destination),
        );
        self.check(target, &command, "install key").await?;
        Ok(())
    }

    async fn check(
        &self,
        target: &SshTarget,
        command: &str,
        step: &'static str,
    ) -> Result<RemoteCommandOutput, TrustError> {
        let output = self
            .executor
            .run(target, command)
            .await
            .map_err(|source| TrustError::Remote {
                host: target.host.clone(),
                step,
                source,
            })?;
        if output.is_success() {
            return Ok(output);
        }
        Err(TrustError::Step {
            host: target.host.clone(),
            step,
            status_text: output
                .exit_code
                .map_or_else(|| String::from("unknown"), |code| code.to_string()),
            stderr: output.stderr.trim().to_owned(),
        })
    }
}

#[cfg(test)]
mod tests;
