//! Batch results returned by the orchestrator.

use std::fmt;

use thiserror::Error;

use crate::cloud::{EipHandle, InstanceStatus};

/// Instance that reached `ACTIVE`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceHandle {
    /// Position in the batch.
    pub index: usize,
    /// Provider identifier.
    pub id: String,
    /// Server name.
    pub name: String,
    /// VPC address.
    pub private_ip: String,
    /// Public address, when one is attached.
    pub public_ip: Option<String>,
    /// Last observed status.
    pub status: InstanceStatus,
    /// Elastic IP bound at creation, if any.
    pub eip_id: Option<String>,
}

/// Why an instance of the batch did not become ready.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FailureReason {
    /// The provider rejected the create request.
    CreateRejected(String),
    /// The provider accepted the request without returning an id.
    MissingId,
    /// The instance entered `ERROR`.
    Errored,
    /// The instance did not become active in time.
    TimedOut,
    /// The instance became active without a private address.
    MissingAddress,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateRejected(message) => write!(f, "create rejected: {message}"),
            Self::MissingId => f.write_str("no server id returned"),
            Self::Errored => f.write_str("entered ERROR state"),
            Self::TimedOut => f.write_str("timed out waiting for ACTIVE"),
            Self::MissingAddress => f.write_str("active without a private address"),
        }
    }
}

impl FailureReason {
    /// Status the provider last reported for an instance that failed this
    /// way.
    #[must_use]
    pub const fn last_status(&self) -> InstanceStatus {
        match self {
            Self::Errored => InstanceStatus::Error,
            Self::MissingAddress => InstanceStatus::Active,
            Self::CreateRejected(_) | Self::MissingId | Self::TimedOut => InstanceStatus::Building,
        }
    }
}

/// Instance of the batch that did not become ready.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionFailure {
    /// Position in the batch.
    pub index: usize,
    /// Server name.
    pub name: String,
    /// Provider id when one was assigned; such instances still bill.
    pub server_id: Option<String>,
    /// Elastic IP bound at creation, if any.
    pub eip_id: Option<String>,
    /// Failure cause.
    pub reason: FailureReason,
}

/// Outcome of [`super::Orchestrator::create_instances`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProvisionReport {
    /// Instances that became active, ordered by index.
    pub ready: Vec<InstanceHandle>,
    /// Instances that did not, ordered by index.
    pub failures: Vec<ProvisionFailure>,
}

impl ProvisionReport {
    /// Number of instances the batch accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.ready.len() + self.failures.len()
    }

    /// Every id the provider assigned, ready or not.
    #[must_use]
    pub fn created_ids(&self) -> Vec<String> {
        self.ready
            .iter()
            .map(|handle| handle.id.clone())
            .chain(
                self.failures
                    .iter()
                    .filter_map(|failure| failure.server_id.clone()),
            )
            .collect()
    }
}

/// Outcome of a deletion batch.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeletionReport {
    /// Ids confirmed deleted (or already gone).
    pub deleted: Vec<String>,
    /// Ids still present after all retries.
    pub failed: Vec<String>,
}

impl DeletionReport {
    /// Returns `true` when nothing failed.
    #[must_use]
    pub fn all_deleted(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of [`super::Orchestrator::cleanup`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TeardownReport {
    /// Instance deletions.
    pub instances: DeletionReport,
    /// Elastic IP releases.
    pub eips: DeletionReport,
}

impl TeardownReport {
    /// Returns `true` when every instance and elastic IP is gone.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.instances.all_deleted() && self.eips.all_deleted()
    }

    /// Ids of every resource still present.
    #[must_use]
    pub fn leftovers(&self) -> Vec<String> {
        self.instances
            .failed
            .iter()
            .chain(&self.eips.failed)
            .cloned()
            .collect()
    }
}

/// Raised when fewer elastic IPs were allocated than requested. The handles
/// that were allocated are returned so the caller can release them.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("allocated {} of {requested} elastic IPs", .allocated.len())]
pub struct PartialAllocation {
    /// Number of elastic IPs requested.
    pub requested: usize,
    /// Handles that were allocated.
    pub allocated: Vec<EipHandle>,
}

impl PartialAllocation {
    /// Ids of the allocated subset.
    #[must_use]
    pub fn allocated_ids(&self) -> Vec<String> {
        self.allocated.iter().map(|eip| eip.id.clone()).collect()
    }
}
