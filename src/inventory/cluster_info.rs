//! Cluster-info files consumed by the trust configurator.

use camino::Utf8Path;
use tracing::warn;

use crate::orchestrator::InstanceHandle;
use crate::request::node_hostname;
use crate::trust::ClusterNode;

use super::{InventoryError, MISSING_ADDRESS, read, write};

/// One node line of a cluster-info file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterEntry {
    /// Cluster hostname.
    pub hostname: String,
    /// Public address; `N/A` in the file.
    pub public_ip: Option<String>,
    /// Provider identifier.
    pub server_id: String,
    /// VPC address.
    pub private_ip: String,
}

impl ClusterEntry {
    /// Node view used by the trust configurator.
    #[must_use]
    pub fn node(&self) -> ClusterNode {
        ClusterNode {
            hostname: self.hostname.clone(),
            public_ip: self.public_ip.clone(),
            private_ip: self.private_ip.clone(),
        }
    }
}

/// Parsed cluster-info file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClusterInfo {
    /// Well-formed entries in file order.
    pub entries: Vec<ClusterEntry>,
    /// Number of non-blank lines skipped as malformed.
    pub skipped: usize,
}

impl ClusterInfo {
    /// Trust configurator nodes for every entry.
    #[must_use]
    pub fn nodes(&self) -> Vec<ClusterNode> {
        self.entries.iter().map(ClusterEntry::node).collect()
    }
}

/// Parses cluster-info text. Blank lines are ignored; lines without
/// exactly four whitespace separated fields are skipped with a warning.
#[must_use]
pub fn parse_cluster_info(text: &str) -> ClusterInfo {
    let mut info = ClusterInfo::default();
    for (position, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] => {}
            [hostname, public_ip, server_id, private_ip] => info.entries.push(ClusterEntry {
                hostname: (*hostname).to_owned(),
                public_ip: (*public_ip != MISSING_ADDRESS).then(|| (*public_ip).to_owned()),
                server_id: (*server_id).to_owned(),
                private_ip: (*private_ip).to_owned(),
            }),
            other => {
                warn!(
                    line = position + 1,
                    fields = other.len(),
                    content = line.trim(),
                    "skipping malformed cluster-info line (expected 4 fields)"
                );
                info.skipped += 1;
            }
        }
    }
    info
}

/// Renders cluster-info lines for the ready instances of a `task_type`
/// batch.
#[must_use]
pub fn render_cluster_info(instances: &[InstanceHandle], task_type: &str) -> String {
    instances
        .iter()
        .map(|instance| {
            format!(
                "{} {} {} {}\n",
                node_hostname(instance.index, task_type),
                instance.public_ip.as_deref().unwrap_or(MISSING_ADDRESS),
                instance.id,
                instance.private_ip,
            )
        })
        .collect()
}

/// Reads the cluster-info file at `path`.
///
/// # Errors
///
/// Returns [`InventoryError::Io`] when the file cannot be read.
pub fn read_cluster_info(path: &Utf8Path) -> Result<ClusterInfo, InventoryError> {
    Ok(parse_cluster_info(&read(path)?))
}

/// Writes the cluster-info file for `instances` to `path`.
///
/// # Errors
///
/// Returns [`InventoryError::Io`] when the file cannot be written.
pub fn write_cluster_info(
    path: &Utf8Path,
    instances: &[InstanceHandle],
    task_type: &str,
) -> Result<(), InventoryError> {
    write(path, &render_cluster_info(instances, task_type))
}
