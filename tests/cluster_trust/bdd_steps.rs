//! BDD step definitions for cluster trust configuration.

use camino::{Utf8Path, Utf8PathBuf};
use ecsfleet::KeyPair;
use ecsfleet::read_cluster_info;
use ecsfleet::test_support::RemoteCall;
use rstest_bdd_macros::{given, then, when};
use tempfile::TempDir;
use tokio::runtime::Runtime;

use super::test_helpers::{
    BOOTSTRAP_KEY, TrustContext, configurator, inventory_line, node_index, public_ip,
};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("step setup failed: {0}")]
    Setup(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a cluster inventory listing {count:u32} nodes")]
fn cluster_inventory(mut trust_context: TrustContext, count: u32) -> TrustContext {
    trust_context.inventory = (0..count as usize).map(inventory_line).collect();
    trust_context
}

#[given("the inventory contains the line \"{line}\"")]
fn inventory_contains(mut trust_context: TrustContext, line: String) -> TrustContext {
    trust_context.inventory.push_str(line.trim());
    trust_context.inventory.push('\n');
    trust_context
}

#[given("a cluster key pair")]
fn cluster_key_pair(mut trust_context: TrustContext) -> TrustContext {
    trust_context.key = Some(KeyPair {
        private_key_path: Utf8PathBuf::from("/keys/cluster_key"),
        public_key: String::from("ssh-rsa AAAAcluster ecsfleet-cluster"),
    });
    trust_context
}

#[given("node \"{hostname}\" refuses connections")]
fn node_refuses(mut trust_context: TrustContext, hostname: String) -> TrustContext {
    let address = public_ip(node_index(hostname.trim()));
    trust_context.executor = trust_context.executor.with_unreachable(&address);
    trust_context
}

#[when("I configure cluster trust")]
fn configure_trust(mut trust_context: TrustContext) -> Result<TrustContext, StepError> {
    let dir = TempDir::new().map_err(|err| StepError::Setup(err.to_string()))?;
    let path = Utf8PathBuf::from_path_buf(dir.path().join("cluster_info.txt"))
        .map_err(|path| StepError::Setup(format!("non UTF-8 path {}", path.display())))?;
    std::fs::write(&path, &trust_context.inventory)
        .map_err(|err| StepError::Setup(err.to_string()))?;
    let cluster = read_cluster_info(&path).map_err(|err| StepError::Setup(err.to_string()))?;

    let key = trust_context
        .key
        .clone()
        .ok_or_else(|| StepError::Setup(String::from("missing cluster key pair")))?;
    let trust = configurator(trust_context.executor.clone());
    let nodes = cluster.nodes();
    let runtime = Runtime::new().map_err(|err| StepError::Setup(err.to_string()))?;
    let report = runtime.block_on(async {
        trust
            .configure_cluster(&nodes, Utf8Path::new(BOOTSTRAP_KEY), &key)
            .await
    });

    trust_context.cluster = Some(cluster);
    trust_context.report = Some(report);
    Ok(trust_context)
}

#[then("{count:u32} nodes are configured")]
fn nodes_configured(trust_context: &TrustContext, count: u32) -> Result<(), StepError> {
    let Some(report) = trust_context.report.as_ref() else {
        return Err(StepError::Assertion(String::from("missing trust report")));
    };
    if report.configured.len() == count as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} configured nodes, got {report:?}"
        )))
    }
}

#[then("configuration failed for \"{hostname}\"")]
fn configuration_failed(trust_context: &TrustContext, hostname: String) -> Result<(), StepError> {
    let Some(report) = trust_context.report.as_ref() else {
        return Err(StepError::Assertion(String::from("missing trust report")));
    };
    let failed: Vec<&str> = report
        .failed
        .iter()
        .map(|failure| failure.hostname.as_str())
        .collect();
    if failed == [hostname.trim()] {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected only {hostname} to fail, got {failed:?}"
        )))
    }
}

#[then("node \"{hostname}\" received the cluster key")]
fn received_cluster_key(trust_context: &TrustContext, hostname: String) -> Result<(), StepError> {
    let address = public_ip(node_index(hostname.trim()));
    let uploads: Vec<String> = trust_context
        .executor
        .calls_for(&address)
        .into_iter()
        .filter_map(|call| match call {
            RemoteCall::Upload { remote, .. } => Some(remote),
            _ => None,
        })
        .collect();
    let has_key = uploads.iter().any(|remote| remote.contains("cluster_key"));
    let has_public = uploads
        .iter()
        .any(|remote| remote.contains("cluster_key.pub"));
    if has_key && has_public {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected key uploads on {hostname}, got {uploads:?}"
        )))
    }
}

#[then("node \"{hostname}\" maps every cluster hostname in /etc/hosts")]
fn hosts_mapped(trust_context: &TrustContext, hostname: String) -> Result<(), StepError> {
    let Some(cluster) = trust_context.cluster.as_ref() else {
        return Err(StepError::Assertion(String::from("missing cluster inventory")));
    };
    let address = public_ip(node_index(hostname.trim()));
    let commands = trust_context.executor.commands_for(&address);
    let Some(write) = commands
        .iter()
        .find(|command| command.contains("/etc/hosts") && !command.starts_with("cat"))
    else {
        return Err(StepError::Assertion(format!(
            "no /etc/hosts write on {hostname}: {commands:?}"
        )));
    };
    let missing: Vec<&str> = cluster
        .entries
        .iter()
        .filter(|entry| !write.contains(&format!("{}\t{}", entry.private_ip, entry.hostname)))
        .map(|entry| entry.hostname.as_str())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "hosts write on {hostname} lacks {missing:?}"
        )))
    }
}

#[then("the inventory skipped {count:u32} line")]
fn inventory_skipped(trust_context: &TrustContext, count: u32) -> Result<(), StepError> {
    let Some(cluster) = trust_context.cluster.as_ref() else {
        return Err(StepError::Assertion(String::from("missing cluster inventory")));
    };
    if cluster.skipped == count as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} skipped lines, got {}",
            cluster.skipped
        )))
    }
}
