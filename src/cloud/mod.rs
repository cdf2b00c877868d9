//! Cloud resource seam used by the orchestrator.
//!
//! [`CloudClient`] covers the six provider calls the lifecycle needs: elastic
//! IP create/delete, server create/show/delete, and job status. The
//! production implementation, [`HcloudClient`], drives the Huawei Cloud
//! `hcloud` CLI.

use std::future::Future;
use std::pin::Pin;

mod error;
pub mod hcloud;
mod types;

pub use error::CloudError;
pub use hcloud::HcloudClient;
pub use types::{
    AddressKind, EipHandle, InstanceStatus, JobState, JobStatus, ServerAddress, ServerDetail,
    ServerSpec, SubJobFailure, select_addresses,
};

/// Future returned by cloud client operations.
pub type CloudFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CloudError>> + Send + 'a>>;

/// Minimal interface over the provider APIs.
///
/// Implementations are shared by reference across concurrent tasks, so they
/// must be `Send + Sync` and hold no per-call mutable state.
pub trait CloudClient: Send + Sync {
    /// Allocates a pay-per-use elastic IP named `name`.
    fn create_eip<'a>(&'a self, name: &'a str, bandwidth_mbps: u32) -> CloudFuture<'a, EipHandle>;

    /// Releases an elastic IP.
    fn delete_eip<'a>(&'a self, eip_id: &'a str) -> CloudFuture<'a, ()>;

    /// Submits a server creation request and returns the assigned id, or
    /// `None` when the provider accepted the request without returning one.
    fn create_server<'a>(&'a self, spec: &'a ServerSpec) -> CloudFuture<'a, Option<String>>;

    /// Fetches the current status and addresses of a server.
    fn show_server<'a>(&'a self, server_id: &'a str) -> CloudFuture<'a, ServerDetail>;

    /// Requests deletion of a server together with its volumes and bound
    /// public IP, returning the asynchronous job id.
    fn delete_server<'a>(&'a self, server_id: &'a str) -> CloudFuture<'a, String>;

    /// Fetches the status of an asynchronous job.
    fn show_job<'a>(&'a self, job_id: &'a str) -> CloudFuture<'a, JobStatus>;
}
