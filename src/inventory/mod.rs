//! Plain-text inventories written after provisioning and read back by
//! teardown and trust configuration.
//!
//! Three files exist per batch, all under one cache directory:
//!
//! - `<run>_<task>_ip_info.txt`: elastic IPs, `ID<TAB>IP`.
//! - `<run>_<task>_instances_info.txt`: instances,
//!   `Index<TAB>ID<TAB>Name<TAB>PrivateIP<TAB>PublicIP<TAB>Status`.
//! - `<run>_<task>_cluster_info.txt`: whitespace separated
//!   `hostname public_ip server_id private_ip` lines.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::info;

use crate::cloud::{EipHandle, InstanceStatus};
use crate::files;
use crate::orchestrator::{InstanceHandle, ProvisionFailure};
use crate::request::ResourceRequest;

mod cluster_info;

pub use cluster_info::{
    ClusterEntry, ClusterInfo, parse_cluster_info, read_cluster_info, render_cluster_info,
    write_cluster_info,
};

/// Placeholder written for a missing public address.
pub const MISSING_ADDRESS: &str = "N/A";

const EIP_HEADER: &str = "ID\tIP";
const INSTANCE_HEADER: &str = "Index\tID\tName\tPrivateIP\tPublicIP\tStatus";

/// Errors raised while reading or writing inventories.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The file could not be read or written.
    #[error("inventory file {path}: {message}")]
    Io {
        /// Inventory path.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// A row could not be parsed.
    #[error("line {line}: {message}")]
    Malformed {
        /// One-based line number.
        line: usize,
        /// What was wrong with the row.
        message: String,
    },
}

fn io_error(path: &Utf8Path) -> impl FnOnce(std::io::Error) -> InventoryError + '_ {
    move |err| InventoryError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

pub(crate) fn read(path: &Utf8Path) -> Result<String, InventoryError> {
    files::read_text(path).map_err(io_error(path))
}

pub(crate) fn write(path: &Utf8Path, contents: &str) -> Result<(), InventoryError> {
    files::write_text(path, contents).map_err(io_error(path))?;
    info!(path = %path, "inventory written");
    Ok(())
}

/// Inventory paths for one batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchFiles {
    dir: Utf8PathBuf,
    stem: String,
}

impl BatchFiles {
    /// Files for the batch described by `request`, stored under `dir`.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>, request: &ResourceRequest) -> Self {
        Self {
            dir: dir.into(),
            stem: request.batch_stem(),
        }
    }

    /// EIP inventory path.
    #[must_use]
    pub fn eips(&self) -> Utf8PathBuf {
        self.path("ip_info")
    }

    /// Instance inventory path.
    #[must_use]
    pub fn instances(&self) -> Utf8PathBuf {
        self.path("instances_info")
    }

    /// Cluster-info path.
    #[must_use]
    pub fn cluster_info(&self) -> Utf8PathBuf {
        self.path("cluster_info")
    }

    fn path(&self, kind: &str) -> Utf8PathBuf {
        self.dir.join(format!("{}_{kind}.txt", self.stem))
    }
}

/// Renders the EIP inventory, header first.
#[must_use]
pub fn render_eips(eips: &[EipHandle]) -> String {
    let mut rendered = format!("{EIP_HEADER}\n");
    for eip in eips {
        rendered.push_str(&format!("{}\t{}\n", eip.id, eip.ip_address));
    }
    rendered
}

/// Extracts EIP ids from an inventory.
///
/// Accepts tab separated, comma separated, and id-only rows. A leading
/// `ID<TAB>IP` or `ID,IP` header and blank lines are skipped.
#[must_use]
pub fn parse_eip_ids(text: &str) -> Vec<String> {
    let mut lines = text.lines().map(str::trim).peekable();
    if lines
        .peek()
        .is_some_and(|first| first.eq_ignore_ascii_case(EIP_HEADER) || first.eq_ignore_ascii_case("id,ip"))
    {
        lines.next();
    }
    lines
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split(['\t', ',']).next())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Writes the EIP inventory to `path`.
///
/// # Errors
///
/// Returns [`InventoryError::Io`] when the file cannot be written.
pub fn write_eips(path: &Utf8Path, eips: &[EipHandle]) -> Result<(), InventoryError> {
    write(path, &render_eips(eips))
}

/// Reads EIP ids from the inventory at `path`.
///
/// # Errors
///
/// Returns [`InventoryError::Io`] when the file cannot be read.
pub fn read_eip_ids(path: &Utf8Path) -> Result<Vec<String>, InventoryError> {
    Ok(parse_eip_ids(&read(path)?))
}

/// Row of the instance inventory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRecord {
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
    /// Status when the inventory was written.
    pub status: InstanceStatus,
}

impl From<&InstanceHandle> for InstanceRecord {
    fn from(handle: &InstanceHandle) -> Self {
        Self {
            index: handle.index,
            id: handle.id.clone(),
            name: handle.name.clone(),
            private_ip: handle.private_ip.clone(),
            public_ip: handle.public_ip.clone(),
            status: handle.status,
        }
    }
}

impl InstanceRecord {
    /// Row for an instance that failed to become ready but still exists at
    /// the provider. Returns `None` when no server id was ever assigned.
    #[must_use]
    pub fn stranded(failure: &ProvisionFailure) -> Option<Self> {
        Some(Self {
            index: failure.index,
            id: failure.server_id.clone()?,
            name: failure.name.clone(),
            private_ip: String::from(MISSING_ADDRESS),
            public_ip: None,
            status: failure.reason.last_status(),
        })
    }
}

/// Renders the instance inventory, header first.
#[must_use]
pub fn render_instances(instances: &[InstanceRecord]) -> String {
    let mut rendered = format!("{INSTANCE_HEADER}\n");
    for instance in instances {
        rendered.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            instance.index,
            instance.id,
            instance.name,
            instance.private_ip,
            instance.public_ip.as_deref().unwrap_or(MISSING_ADDRESS),
            instance.status,
        ));
    }
    rendered
}

/// Parses an instance inventory.
///
/// # Errors
///
/// Returns [`InventoryError::Malformed`] for a row without six fields, a
/// non-numeric index, or an unknown status.
pub fn parse_instances(text: &str) -> Result<Vec<InstanceRecord>, InventoryError> {
    let mut records = Vec::new();
    for (position, raw) in text.lines().enumerate() {
        let line = raw.trim_end();
        if line.trim().is_empty() || (position == 0 && line == INSTANCE_HEADER) {
            continue;
        }
        records.push(parse_instance_row(position + 1, line)?);
    }
    Ok(records)
}

fn parse_instance_row(line_number: usize, line: &str) -> Result<InstanceRecord, InventoryError> {
    let malformed = |message: String| InventoryError::Malformed {
        line: line_number,
        message,
    };
    let fields: Vec<&str> = line.split('\t').collect();
    let [index, id, name, private_ip, public_ip, status] = fields.as_slice() else {
        return Err(malformed(format!("expected 6 fields, found {}", fields.len())));
    };
    let parsed_index = index
        .parse::<usize>()
        .map_err(|_| malformed(format!("invalid index '{index}'")))?;
    let parsed_status = status.parse::<InstanceStatus>().map_err(malformed)?;
    Ok(InstanceRecord {
        index: parsed_index,
        id: (*id).to_owned(),
        name: (*name).to_owned(),
        private_ip: (*private_ip).to_owned(),
        public_ip: (*public_ip != MISSING_ADDRESS).then(|| (*public_ip).to_owned()),
        status: parsed_status,
    })
}

/// Writes the instance inventory to `path`.
///
/// # Errors
///
/// Returns [`InventoryError::Io`] when the file cannot be written.
pub fn write_instances(path: &Utf8Path, instances: &[InstanceRecord]) -> Result<(), InventoryError> {
    write(path, &render_instances(instances))
}

/// Reads the instance inventory at `path`.
///
/// # Errors
///
/// Returns [`InventoryError::Io`] when the file cannot be read and
/// [`InventoryError::Malformed`] when a row cannot be parsed.
pub fn read_instances(path: &Utf8Path) -> Result<Vec<InstanceRecord>, InventoryError> {
    parse_instances(&read(path)?)
}
