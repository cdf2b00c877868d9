//! Resource lifecycle orchestration: elastic IPs, instances, and guaranteed
//! teardown.
//!
//! Every batch operation fans out over a bounded number of concurrent tasks
//! and waits for all of them before aggregating results. A failure inside one
//! task becomes an entry in the batch report and never aborts its siblings.

use std::time::Duration;

use crate::cloud::CloudClient;
use crate::retry::RetryPolicy;

mod provision;
mod report;
mod teardown;

pub use report::{
    DeletionReport, FailureReason, InstanceHandle, PartialAllocation, ProvisionFailure,
    ProvisionReport, TeardownReport,
};

/// Upper bound on concurrent elastic IP and instance creations.
pub const CREATE_CONCURRENCY: usize = 10;

/// Upper bound on concurrent deletions.
pub const DELETE_CONCURRENCY: usize = 5;

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const READY_TIMEOUT: Duration = Duration::from_secs(300);
const JOB_POLL_INTERVAL: Duration = Duration::from_secs(10);
const JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// Drives provisioning and teardown through a shared cloud client.
#[derive(Clone, Debug)]
pub struct Orchestrator<C: CloudClient> {
    cloud: C,
    poll_interval: Duration,
    ready_timeout: Duration,
    job_poll_interval: Duration,
    job_timeout: Duration,
    delete_retry: RetryPolicy,
}

impl<C: CloudClient> Orchestrator<C> {
    /// Creates an orchestrator with production timings.
    #[must_use]
    pub const fn new(cloud: C) -> Self {
        Self {
            cloud,
            poll_interval: POLL_INTERVAL,
            ready_timeout: READY_TIMEOUT,
            job_poll_interval: JOB_POLL_INTERVAL,
            job_timeout: JOB_TIMEOUT,
            delete_retry: RetryPolicy::deletion(),
        }
    }

    /// Overrides the instance status polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides how long an instance may take to become active.
    #[must_use]
    pub const fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Overrides the deletion job polling interval.
    #[must_use]
    pub const fn with_job_poll_interval(mut self, interval: Duration) -> Self {
        self.job_poll_interval = interval;
        self
    }

    /// Overrides how long a deletion job may run.
    #[must_use]
    pub const fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Overrides the retry policy for instance and elastic IP deletion.
    #[must_use]
    pub const fn with_delete_retry(mut self, policy: RetryPolicy) -> Self {
        self.delete_retry = policy;
        self
    }
}

/// Number of status polls that fit in `timeout` at `interval` spacing,
/// never less than one.
fn poll_attempts(timeout: Duration, interval: Duration) -> u32 {
    let step = interval.as_millis().max(1);
    let attempts = timeout.as_millis().div_ceil(step).max(1);
    u32::try_from(attempts).unwrap_or(u32::MAX)
}
