//! Core library for the `ecsfleet` ephemeral cluster tool.
//!
//! The crate provisions short-lived Huawei Cloud ECS batches for CI jobs,
//! configures passwordless SSH and hostname resolution across each batch,
//! and guarantees teardown. Provider calls go through the [`CloudClient`]
//! seam and remote commands through the [`RemoteExecutor`] seam, so every
//! workflow runs against in-memory fakes in tests.

pub mod cloud;
pub mod config;
pub mod exec;
mod files;
pub mod inventory;
pub mod orchestrator;
pub mod pool;
pub mod remote;
pub mod request;
pub mod retry;
pub mod run;
pub mod test_support;
pub mod trust;

pub use cloud::{CloudClient, CloudError, EipHandle, HcloudClient, InstanceStatus};
pub use config::{ConfigError, HuaweiConfig};
pub use exec::{CommandOutput, CommandRunner, ExecError, ProcessCommandRunner};
pub use inventory::{
    BatchFiles, ClusterInfo, InventoryError, read_cluster_info, read_eip_ids, read_instances,
};
pub use orchestrator::{
    DeletionReport, InstanceHandle, Orchestrator, PartialAllocation, ProvisionReport,
    TeardownReport,
};
pub use remote::{RemoteExecutor, SshConfig, SshExecutor, SshTarget};
pub use request::{RequestError, ResourceRequest, ResourceRequestBuilder};
pub use retry::{Backoff, RetryPolicy};
pub use run::{KeySource, Provisioned, RunError, RunOutcome, RunPlan, TaskRunner};
pub use trust::{ClusterNode, KeyPair, TrustConfigurator, TrustError, TrustReport};
