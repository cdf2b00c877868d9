//! Immutable description of a fleet of instances to provision.

use thiserror::Error;

/// Bandwidth in Mbit/s used for elastic IPs when the caller does not choose.
pub const DEFAULT_BANDWIDTH_MBPS: u32 = 5;

/// Parameters describing one provisioning batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceRequest {
    /// Number of instances to create.
    pub count: usize,
    /// ECS flavour (for example `c7.large.2`).
    pub instance_type: String,
    /// Availability zone (for example `ap-southeast-3a`).
    pub zone: String,
    /// Image identifier used for the system disk.
    pub image_id: String,
    /// Name of the cloud key pair injected into every instance.
    pub key_pair: String,
    /// Security group attached to the primary NIC.
    pub security_group_id: String,
    /// Subnet hosting the primary NIC.
    pub subnet_id: String,
    /// VPC owning the subnet.
    pub vpc_id: String,
    /// CI run number used to namespace resource names.
    pub run_number: String,
    /// Task type used to namespace resource and host names.
    pub task_type: String,
    /// Lifetime after which the provider terminates the instance.
    pub timeout_hours: u32,
    /// Actor recorded in names and tags for auditing.
    pub actor: String,
    /// Whether an elastic IP is allocated and bound to each instance.
    pub use_public_ip: bool,
    /// Elastic IP bandwidth in Mbit/s.
    pub bandwidth_mbps: u32,
}

impl ResourceRequest {
    /// Starts a builder for a [`ResourceRequest`].
    #[must_use]
    pub fn builder() -> ResourceRequestBuilder {
        ResourceRequestBuilder::new()
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing or a numeric field is zero.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when a string field is empty and
    /// [`RequestError::OutOfRange`] when a count or duration is zero.
    pub fn validate(&self) -> Result<(), RequestError> {
        let required = [
            ("instance_type", &self.instance_type),
            ("zone", &self.zone),
            ("image_id", &self.image_id),
            ("key_pair", &self.key_pair),
            ("security_group_id", &self.security_group_id),
            ("subnet_id", &self.subnet_id),
            ("vpc_id", &self.vpc_id),
            ("run_number", &self.run_number),
            ("task_type", &self.task_type),
            ("actor", &self.actor),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(RequestError::Validation((*field).to_owned()));
        }
        if self.count == 0 {
            return Err(RequestError::OutOfRange {
                field: String::from("count"),
            });
        }
        if self.timeout_hours == 0 {
            return Err(RequestError::OutOfRange {
                field: String::from("timeout_hours"),
            });
        }
        if self.use_public_ip && self.bandwidth_mbps == 0 {
            return Err(RequestError::OutOfRange {
                field: String::from("bandwidth_mbps"),
            });
        }
        Ok(())
    }

    /// Name given to the instance at `index`.
    #[must_use]
    pub fn instance_name(&self, index: usize) -> String {
        format!(
            "{}-{}-node{index}-timeout{}-{}",
            self.run_number, self.task_type, self.timeout_hours, self.actor
        )
    }

    /// Hostname configured through cloud-init for the instance at `index`.
    #[must_use]
    pub fn hostname(&self, index: usize) -> String {
        node_hostname(index, &self.task_type)
    }

    /// Shared `<run>_<task>` stem used for elastic IP names and inventory
    /// file names.
    #[must_use]
    pub fn batch_stem(&self) -> String {
        format!("{}_{}", self.run_number, self.task_type)
    }

    /// Value of the `Name` tag shared by every instance in the batch.
    #[must_use]
    pub fn batch_tag(&self) -> String {
        format!("{}-{}", self.run_number, self.task_type)
    }
}

/// Hostname assigned to cluster node `index` of `task_type`.
#[must_use]
pub fn node_hostname(index: usize, task_type: &str) -> String {
    format!("node{index}-{task_type}")
}

/// Builder for [`ResourceRequest`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceRequestBuilder {
    count: usize,
    instance_type: String,
    zone: String,
    image_id: String,
    key_pair: String,
    security_group_id: String,
    subnet_id: String,
    vpc_id: String,
    run_number: String,
    task_type: String,
    timeout_hours: u32,
    actor: String,
    use_public_ip: bool,
    bandwidth_mbps: u32,
}

impl Default for ResourceRequestBuilder {
    fn default() -> Self {
        Self {
            count: 1,
            instance_type: String::new(),
            zone: String::new(),
            image_id: String::new(),
            key_pair: String::new(),
            security_group_id: String::new(),
            subnet_id: String::new(),
            vpc_id: String::new(),
            run_number: String::new(),
            task_type: String::new(),
            timeout_hours: 1,
            actor: String::new(),
            use_public_ip: false,
            bandwidth_mbps: DEFAULT_BANDWIDTH_MBPS,
        }
    }
}

impl ResourceRequestBuilder {
    /// Creates a builder for a single instance with a one hour lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of instances.
    #[must_use]
    pub const fn count(mut self, value: usize) -> Self {
        self.count = value;
        self
    }

    /// Sets the flavour.
    #[must_use]
    pub fn instance_type(mut self, value: impl Into<String>) -> Self {
        self.instance_type = value.into();
        self
    }

    /// Sets the availability zone.
    #[must_use]
    pub fn zone(mut self, value: impl Into<String>) -> Self {
        self.zone = value.into();
        self
    }

    /// Sets the image identifier.
    #[must_use]
    pub fn image_id(mut self, value: impl Into<String>) -> Self {
        self.image_id = value.into();
        self
    }

    /// Sets the cloud key pair name.
    #[must_use]
    pub fn key_pair(mut self, value: impl Into<String>) -> Self {
        self.key_pair = value.into();
        self
    }

    /// Sets the security group identifier.
    #[must_use]
    pub fn security_group_id(mut self, value: impl Into<String>) -> Self {
        self.security_group_id = value.into();
        self
    }

    /// Sets the subnet identifier.
    #[must_use]
    pub fn subnet_id(mut self, value: impl Into<String>) -> Self {
        self.subnet_id = value.into();
        self
    }

    /// Sets the VPC identifier.
    #[must_use]
    pub fn vpc_id(mut self, value: impl Into<String>) -> Self {
        self.vpc_id = value.into();
        self
    }

    /// Sets the CI run number.
    #[must_use]
    pub fn run_number(mut self, value: impl Into<String>) -> Self {
        self.run_number = value.into();
        self
    }

    /// Sets the task type.
    #[must_use]
    pub fn task_type(mut self, value: impl Into<String>) -> Self {
        self.task_type = value.into();
        self
    }

    /// Sets the auto-termination lifetime in hours.
    #[must_use]
    pub const fn timeout_hours(mut self, value: u32) -> Self {
        self.timeout_hours = value;
        self
    }

    /// Sets the actor.
    #[must_use]
    pub fn actor(mut self, value: impl Into<String>) -> Self {
        self.actor = value.into();
        self
    }

    /// Enables or disables elastic IP allocation.
    #[must_use]
    pub const fn use_public_ip(mut self, value: bool) -> Self {
        self.use_public_ip = value;
        self
    }

    /// Sets the elastic IP bandwidth.
    #[must_use]
    pub const fn bandwidth_mbps(mut self, value: u32) -> Self {
        self.bandwidth_mbps = value;
        self
    }

    /// Builds and validates the [`ResourceRequest`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when any required field is empty or zero.
    pub fn build(self) -> Result<ResourceRequest, RequestError> {
        let request = ResourceRequest {
            count: self.count,
            instance_type: self.instance_type.trim().to_owned(),
            zone: self.zone.trim().to_owned(),
            image_id: self.image_id.trim().to_owned(),
            key_pair: self.key_pair.trim().to_owned(),
            security_group_id: self.security_group_id.trim().to_owned(),
            subnet_id: self.subnet_id.trim().to_owned(),
            vpc_id: self.vpc_id.trim().to_owned(),
            run_number: self.run_number.trim().to_owned(),
            task_type: self.task_type.trim().to_owned(),
            timeout_hours: self.timeout_hours,
            actor: self.actor.trim().to_owned(),
            use_public_ip: self.use_public_ip,
            bandwidth_mbps: self.bandwidth_mbps,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Errors raised while building a [`ResourceRequest`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
    /// Raised when a numeric field must be greater than zero.
    #[error("{field} must be greater than zero")]
    OutOfRange {
        /// Field that failed validation.
        field: String,
    },
}
