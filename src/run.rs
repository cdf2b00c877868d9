//! End-to-end task runs on an ephemeral cluster.
//!
//! [`TaskRunner`] provisions a batch, records its inventories, configures
//! cluster trust, runs one command on the first node, optionally collects a
//! log file from every node, and tears the batch down. Teardown is always
//! attempted once instances exist; the remote exit code is preserved so
//! callers observe the same status locally.

use std::collections::BTreeSet;
use std::mem;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::cloud::{CloudClient, EipHandle};
use crate::exec::{CommandRunner, ExecError, expand_tilde};
use crate::files;
use crate::inventory::{
    BatchFiles, InstanceRecord, InventoryError, write_cluster_info, write_eips, write_instances,
};
use crate::orchestrator::{Orchestrator, PartialAllocation, ProvisionReport, TeardownReport};
use crate::remote::{RemoteCommandOutput, RemoteExecutor, SshTarget};
use crate::request::ResourceRequest;
use crate::trust::{ClusterNode, KeyPair, TrustConfigurator, TrustError, TrustReport, ensure_local_key_pair};

/// Errors surfaced while running a task on a cluster.
#[derive(Debug, Error)]
pub enum RunError {
    /// Fewer elastic IPs than requested were allocated. The subset has
    /// already been released.
    #[error("elastic IP allocation failed: {source}")]
    Allocation {
        /// Allocation outcome.
        #[source]
        source: PartialAllocation,
    },
    /// No instance of the batch became active.
    #[error("none of the {requested} requested instances became ready")]
    NoInstancesReady {
        /// Batch size.
        requested: usize,
    },
    /// An inventory could not be written.
    #[error("failed to record inventory: {0}")]
    Inventory(#[from] InventoryError),
    /// The local cluster key pair could not be prepared.
    #[error("cluster key pair unavailable: {0}")]
    KeyPair(#[source] TrustError),
    /// At least one node could not be configured.
    #[error("trust configuration failed on {}", .failed.join(", "))]
    Trust {
        /// Hostnames that failed.
        failed: Vec<String>,
    },
    /// The remote command could not be started.
    #[error("remote command failed to start: {0}")]
    Remote(#[source] ExecError),
    /// Resources were left behind after the run.
    #[error("teardown left resources behind: {}", .leftovers.join(", "))]
    Teardown {
        /// Ids still present.
        leftovers: Vec<String>,
    },
}

/// Elastic IPs and instances of a provisioned batch.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Provisioned {
    /// Allocated elastic IPs, empty unless public IPs were requested.
    pub eips: Vec<EipHandle>,
    /// Instance outcomes.
    pub report: ProvisionReport,
}

impl Provisioned {
    /// Trust configurator view of the ready instances.
    #[must_use]
    pub fn nodes(&self, task_type: &str) -> Vec<ClusterNode> {
        self.report
            .ready
            .iter()
            .map(|handle| ClusterNode::from_handle(handle, task_type))
            .collect()
    }
}

/// Where the cluster key pair lives locally and how to create it.
#[derive(Clone, Debug)]
pub struct KeySource<R: CommandRunner> {
    runner: R,
    keygen_bin: String,
    path: Utf8PathBuf,
}

impl<R: CommandRunner> KeySource<R> {
    /// Key pair at `path` (tilde expanded), generated with `keygen_bin` when
    /// missing.
    #[must_use]
    pub fn new(runner: R, keygen_bin: impl Into<String>, path: &str) -> Self {
        Self {
            runner,
            keygen_bin: keygen_bin.into(),
            path: Utf8PathBuf::from(expand_tilde(path)),
        }
    }

    /// Local private key path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Loads or generates the key pair.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError`] when the key pair cannot be read or created.
    pub async fn ensure(&self) -> Result<KeyPair, TrustError> {
        ensure_local_key_pair(&self.runner, &self.keygen_bin, &self.path).await
    }
}

/// Parameters of one task run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunPlan {
    /// Batch to provision.
    pub request: ResourceRequest,
    /// Key accepted by fresh instances.
    pub bootstrap_key: Utf8PathBuf,
    /// Command run on the first node.
    pub command: String,
    /// Remote file collected from every node after the command.
    pub download: Option<String>,
    /// Local directory receiving collected files.
    pub download_dir: Utf8PathBuf,
    /// Continue when some nodes could not be configured.
    pub allow_degraded: bool,
}

impl RunPlan {
    /// Plan that runs `command` without collecting files.
    #[must_use]
    pub fn new(
        request: ResourceRequest,
        bootstrap_key: impl Into<Utf8PathBuf>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            request,
            bootstrap_key: bootstrap_key.into(),
            command: command.into(),
            download: None,
            download_dir: Utf8PathBuf::from("."),
            allow_degraded: false,
        }
    }

    /// Collects `remote` from every node into `dir` as
    /// `<hostname>_<file name>`.
    #[must_use]
    pub fn with_download(mut self, remote: impl Into<String>, dir: impl Into<Utf8PathBuf>) -> Self {
        self.download = Some(remote.into());
        self.download_dir = dir.into();
        self
    }

    /// Allows the command to run when some nodes failed trust configuration.
    #[must_use]
    pub const fn with_allow_degraded(mut self, allow: bool) -> Self {
        self.allow_degraded = allow;
        self
    }
}

/// Result of a successful run with a clean teardown.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunOutcome {
    /// Output of the remote command; its exit code is the run's status.
    pub output: RemoteCommandOutput,
    /// Local paths of collected files.
    pub downloaded: Vec<Utf8PathBuf>,
}

/// Runs tasks on ephemeral clusters.
#[derive(Debug)]
pub struct TaskRunner<C: CloudClient, X: RemoteExecutor, R: CommandRunner> {
    orchestrator: Orchestrator<C>,
    trust: TrustConfigurator<X>,
    key: KeySource<R>,
    cache_dir: Utf8PathBuf,
}

impl<C, X, R> TaskRunner<C, X, R>
where
    C: CloudClient,
    X: RemoteExecutor,
    R: CommandRunner,
{
    /// Creates a runner that records inventories under `cache_dir`.
    #[must_use]
    pub fn new(
        orchestrator: Orchestrator<C>,
        trust: TrustConfigurator<X>,
        key: KeySource<R>,
        cache_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            orchestrator,
            trust,
            key,
            cache_dir: cache_dir.into(),
        }
    }

    /// Allocates elastic IPs when requested, creates the instances, and
    /// writes the batch inventories.
    ///
    /// Instances that fail to become ready are deleted right away together
    /// with their elastic IPs. Any that cannot be deleted are kept in the
    /// returned report and listed in the instance inventory with their last
    /// status. Resources are released before an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Allocation`] on partial elastic IP allocation,
    /// [`RunError::NoInstancesReady`] when no instance became active, and
    /// [`RunError::Inventory`] when an inventory cannot be written.
    pub async fn provision(&self, request: &ResourceRequest) -> Result<Provisioned, RunError> {
        let eips = if request.use_public_ip {
            self.allocate(request).await?
        } else {
            Vec::new()
        };
        let eip_slice = request.use_public_ip.then_some(eips.as_slice());
        let report = self.orchestrator.create_instances(request, eip_slice).await;
        let mut provisioned = Provisioned { eips, report };
        self.reclaim_failures(&mut provisioned).await;

        if provisioned.report.ready.is_empty() {
            self.release(&provisioned).await;
            return Err(RunError::NoInstancesReady {
                requested: request.count,
            });
        }
        if let Err(err) = self.record(request, &provisioned) {
            self.release(&provisioned).await;
            return Err(err);
        }
        info!(
            ready = provisioned.report.ready.len(),
            requested = request.count,
            "batch provisioned"
        );
        Ok(provisioned)
    }

    /// Ensures the cluster key pair exists locally and configures trust on
    /// every node.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::KeyPair`] when the key pair cannot be prepared.
    pub async fn configure(
        &self,
        nodes: &[ClusterNode],
        bootstrap_key: &Utf8Path,
    ) -> Result<TrustReport, RunError> {
        let key = self.key.ensure().await.map_err(RunError::KeyPair)?;
        Ok(self.trust.configure_cluster(nodes, bootstrap_key, &key).await)
    }

    /// Deletes every instance the batch created and every elastic IP not
    /// released with its instance.
    pub async fn teardown(&self, provisioned: &Provisioned) -> TeardownReport {
        self.orchestrator
            .cleanup(&provisioned.report, &provisioned.eips)
            .await
    }

    /// Runs `plan` end to end.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] when provisioning, trust configuration, or the
    /// remote command fails, and [`RunError::Teardown`] when resources are
    /// left behind after an otherwise successful run.
    pub async fn execute(&self, plan: &RunPlan) -> Result<RunOutcome, RunError> {
        let provisioned = self.provision(&plan.request).await?;
        let result = self.run_on_cluster(plan, &provisioned).await;
        let teardown = self.teardown(&provisioned).await;

        if !teardown.is_clean() {
            let leftovers = teardown.leftovers();
            error!(leftovers = ?leftovers, "teardown incomplete; delete these resources manually");
            if result.is_ok() {
                return Err(RunError::Teardown { leftovers });
            }
        }
        result
    }

    async fn allocate(&self, request: &ResourceRequest) -> Result<Vec<EipHandle>, RunError> {
        match self
            .orchestrator
            .allocate_eips(request.count, &request.batch_stem(), request.bandwidth_mbps)
            .await
        {
            Ok(eips) => Ok(eips),
            Err(partial) => {
                let released = self
                    .orchestrator
                    .delete_eips(&partial.allocated_ids())
                    .await;
                if !released.all_deleted() {
                    error!(eips = ?released.failed, "failed to release partially allocated elastic IPs");
                }
                Err(RunError::Allocation { source: partial })
            }
        }
    }

    /// Deletes instances that failed to become ready and releases their
    /// elastic IPs. Whatever survives stays in `provisioned` so it is
    /// recorded and torn down with the rest of the batch.
    async fn reclaim_failures(&self, provisioned: &mut Provisioned) {
        if provisioned.report.failures.is_empty() {
            return;
        }
        let failed = ProvisionReport {
            ready: Vec::new(),
            failures: mem::take(&mut provisioned.report.failures),
        };
        let failed_eip_ids: BTreeSet<&str> = failed
            .failures
            .iter()
            .filter_map(|failure| failure.eip_id.as_deref())
            .collect();
        let (failed_eips, held_eips): (Vec<EipHandle>, Vec<EipHandle>) =
            mem::take(&mut provisioned.eips)
                .into_iter()
                .partition(|eip| failed_eip_ids.contains(eip.id.as_str()));

        info!(count = failed.failures.len(), "reclaiming instances that did not become ready");
        let teardown = self.orchestrator.cleanup(&failed, &failed_eips).await;

        provisioned.eips = held_eips;
        provisioned.eips.extend(
            failed_eips
                .into_iter()
                .filter(|eip| teardown.eips.failed.contains(&eip.id)),
        );
        provisioned.report.failures = failed
            .failures
            .into_iter()
            .filter(|failure| {
                failure
                    .server_id
                    .as_ref()
                    .is_some_and(|id| teardown.instances.failed.contains(id))
            })
            .collect();
        if !teardown.is_clean() {
            warn!(leftovers = ?teardown.leftovers(), "recording resources that could not be reclaimed");
        }
    }

    fn record(&self, request: &ResourceRequest, provisioned: &Provisioned) -> Result<(), RunError> {
        let paths = BatchFiles::new(self.cache_dir.clone(), request);
        if request.use_public_ip {
            write_eips(&paths.eips(), &provisioned.eips)?;
        }
        let instances: Vec<InstanceRecord> = provisioned
            .report
            .ready
            .iter()
            .map(InstanceRecord::from)
            .chain(
                provisioned
                    .report
                    .failures
                    .iter()
                    .filter_map(InstanceRecord::stranded),
            )
            .collect();
        write_instances(&paths.instances(), &instances)?;
        write_cluster_info(
            &paths.cluster_info(),
            &provisioned.report.ready,
            &request.task_type,
        )?;
        Ok(())
    }

    async fn release(&self, provisioned: &Provisioned) {
        let teardown = self.teardown(provisioned).await;
        if !teardown.is_clean() {
            error!(leftovers = ?teardown.leftovers(), "release incomplete; delete these resources manually");
        }
    }

    async fn run_on_cluster(
        &self,
        plan: &RunPlan,
        provisioned: &Provisioned,
    ) -> Result<RunOutcome, RunError> {
        let nodes = provisioned.nodes(&plan.request.task_type);
        let report = self.configure(&nodes, &plan.bootstrap_key).await?;
        if !report.all_configured() {
            let failed: Vec<String> = report
                .failed
                .iter()
                .map(|failure| failure.hostname.clone())
                .collect();
            if !plan.allow_degraded {
                return Err(RunError::Trust { failed });
            }
            warn!(failed = ?failed, "continuing with a degraded cluster");
        }

        let Some(head) = nodes.first() else {
            return Err(RunError::NoInstancesReady {
                requested: plan.request.count,
            });
        };
        let target = SshTarget::new(head.connect_address(), Some(plan.bootstrap_key.as_path()));
        info!(node = %head.hostname, command = %plan.command, "running task");
        let output = self
            .trust
            .executor()
            .run(&target, &plan.command)
            .await
            .map_err(RunError::Remote)?;
        info!(node = %head.hostname, status = ?output.exit_code, "task finished");

        let downloaded = match &plan.download {
            Some(remote) => self.collect(&nodes, plan, remote).await,
            None => Vec::new(),
        };
        Ok(RunOutcome { output, downloaded })
    }

    async fn collect(&self, nodes: &[ClusterNode], plan: &RunPlan, remote: &str) -> Vec<Utf8PathBuf> {
        let file_name = Utf8Path::new(remote).file_name().unwrap_or("output");
        let mut downloaded = Vec::new();
        for node in nodes {
            let local = plan
                .download_dir
                .join(format!("{}_{file_name}", node.hostname));
            if let Err(err) = files::create_parent(&local) {
                warn!(path = %local, error = %err, "cannot create download directory");
                continue;
            }
            let target = SshTarget::new(node.connect_address(), Some(plan.bootstrap_key.as_path()));
            match self.trust.executor().download(&target, remote, &local).await {
                Ok(()) => {
                    info!(node = %node.hostname, path = %local, "downloaded");
                    downloaded.push(local);
                }
                Err(err) => warn!(node = %node.hostname, error = %err, "download failed"),
            }
        }
        downloaded
    }
}
