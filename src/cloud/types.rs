//! Value types exchanged with cloud clients.

use std::fmt;
use std::str::FromStr;

use crate::request::ResourceRequest;

/// Elastic IP allocated for one instance of a batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EipHandle {
    /// Provider identifier.
    pub id: String,
    /// Allocated public address.
    pub ip_address: String,
    /// Name (and bandwidth name) given at allocation.
    pub name: String,
}

/// Coarse lifecycle status of a server.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InstanceStatus {
    /// Accepted but not yet running.
    Building,
    /// Running and reachable.
    Active,
    /// Provisioning failed.
    Error,
}

impl InstanceStatus {
    /// Maps a provider status string onto the lifecycle status. Anything other
    /// than `ACTIVE` or `ERROR` is treated as still building.
    #[must_use]
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Self::Active,
            "ERROR" => Self::Error,
            _ => Self::Building,
        }
    }

    /// Canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Building => "BUILDING",
            Self::Active => "ACTIVE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BUILD" | "BUILDING" => Ok(Self::Building),
            "ACTIVE" => Ok(Self::Active),
            "ERROR" => Ok(Self::Error),
            other => Err(format!("unknown instance status '{other}'")),
        }
    }
}

/// How an address is attached to a server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressKind {
    /// VPC address on the NIC.
    Fixed,
    /// Elastic IP bound to the NIC.
    Floating,
    /// Untagged or unknown attachment.
    Other,
}

impl AddressKind {
    /// Parses the provider's `OS-EXT-IPS:type` tag.
    #[must_use]
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag.map(str::trim) {
            Some("fixed") => Self::Fixed,
            Some("floating") => Self::Floating,
            _ => Self::Other,
        }
    }
}

/// Address reported for a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerAddress {
    /// IP address text.
    pub addr: String,
    /// Attachment kind.
    pub kind: AddressKind,
}

impl ServerAddress {
    /// Creates an address entry.
    #[must_use]
    pub fn new(addr: impl Into<String>, kind: AddressKind) -> Self {
        Self {
            addr: addr.into(),
            kind,
        }
    }

    fn is_ipv4(&self) -> bool {
        !self.addr.contains(':')
    }
}

/// Snapshot of a server returned by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerDetail {
    /// Provider identifier.
    pub id: String,
    /// Current status.
    pub status: InstanceStatus,
    /// Addresses across all attached networks.
    pub addresses: Vec<ServerAddress>,
}

/// Selects `(private, public)` addresses by their type tag: the first fixed
/// IPv4 address is private and the first floating address is public.
#[must_use]
pub fn select_addresses(addresses: &[ServerAddress]) -> (Option<String>, Option<String>) {
    let private = addresses
        .iter()
        .find(|address| address.kind == AddressKind::Fixed && address.is_ipv4())
        .or_else(|| {
            addresses
                .iter()
                .find(|address| address.kind == AddressKind::Fixed)
        })
        .map(|address| address.addr.clone());
    let public = addresses
        .iter()
        .find(|address| address.kind == AddressKind::Floating)
        .map(|address| address.addr.clone());
    (private, public)
}

/// Fully resolved parameters for one server creation call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerSpec {
    /// Server name.
    pub name: String,
    /// Hostname set through cloud-init.
    pub hostname: String,
    /// Flavour.
    pub flavor: String,
    /// Image identifier.
    pub image_id: String,
    /// Availability zone.
    pub zone: String,
    /// VPC identifier.
    pub vpc_id: String,
    /// Subnet identifier.
    pub subnet_id: String,
    /// Security group identifier.
    pub security_group_id: String,
    /// Cloud key pair name.
    pub key_pair: String,
    /// Server tags as key/value pairs.
    pub tags: Vec<(String, String)>,
    /// Auto-termination time formatted `%Y-%m-%dT%H:%M:%SZ`.
    pub auto_terminate_at: String,
    /// Elastic IP to bind, if any.
    pub eip_id: Option<String>,
}

impl ServerSpec {
    /// Derives the spec for instance `index` of `request`.
    #[must_use]
    pub fn for_index(
        request: &ResourceRequest,
        index: usize,
        eip_id: Option<String>,
        auto_terminate_at: &str,
    ) -> Self {
        let tags = vec![
            (String::from("Name"), request.batch_tag()),
            (String::from("Index"), index.to_string()),
            (String::from("WarningHours"), request.timeout_hours.to_string()),
            (String::from("Actor"), request.actor.clone()),
        ];
        Self {
            name: request.instance_name(index),
            hostname: request.hostname(index),
            flavor: request.instance_type.clone(),
            image_id: request.image_id.clone(),
            zone: request.zone.clone(),
            vpc_id: request.vpc_id.clone(),
            subnet_id: request.subnet_id.clone(),
            security_group_id: request.security_group_id.clone(),
            key_pair: request.key_pair.clone(),
            tags,
            auto_terminate_at: auto_terminate_at.to_owned(),
            eip_id,
        }
    }

    /// Cloud-init document that sets the hostname.
    #[must_use]
    pub fn user_data(&self) -> String {
        format!("#cloud-config\nhostname: {}\n", self.hostname)
    }
}

/// Terminal or in-flight state of an asynchronous job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobState {
    /// The job completed successfully.
    Success,
    /// The job failed.
    Failed,
    /// The job is still running; carries the raw provider status.
    Pending(String),
}

impl JobState {
    /// Parses a provider job status.
    #[must_use]
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Self::Success,
            "FAIL" | "FAILED" => Self::Failed,
            other => Self::Pending(other.to_owned()),
        }
    }
}

/// Failed sub-job of a batch job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubJobFailure {
    /// Server the sub-job acted on, when reported.
    pub server_id: Option<String>,
    /// Provider failure reason, when reported.
    pub reason: Option<String>,
}

/// Status of an asynchronous job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobStatus {
    /// Current state.
    pub state: JobState,
    /// Top-level failure reason, when reported.
    pub fail_reason: Option<String>,
    /// Sub-jobs that reported failure.
    pub failed_sub_jobs: Vec<SubJobFailure>,
}
