//! Shared fixtures and helpers for cluster trust BDD scenarios.

use std::time::Duration;

use ecsfleet::test_support::FakeExecutor;
use ecsfleet::{Backoff, ClusterInfo, KeyPair, RetryPolicy, TrustConfigurator, TrustReport};
use rstest::fixture;

pub const BOOTSTRAP_KEY: &str = "/keys/bootstrap";

#[derive(Clone, Debug)]
pub struct TrustContext {
    pub inventory: String,
    pub key: Option<KeyPair>,
    pub executor: FakeExecutor,
    pub cluster: Option<ClusterInfo>,
    pub report: Option<TrustReport>,
}

#[fixture]
pub fn trust_context() -> TrustContext {
    TrustContext {
        inventory: String::new(),
        key: None,
        executor: FakeExecutor::new(),
        cluster: None,
        report: None,
    }
}

/// Public address of `node<index>-spark` in generated inventories.
pub fn public_ip(index: usize) -> String {
    format!("203.0.113.{}", index + 1)
}

/// Inventory line for `node<index>-spark`.
pub fn inventory_line(index: usize) -> String {
    format!(
        "node{index}-spark {} srv-{index} 10.0.0.{}\n",
        public_ip(index),
        index + 1
    )
}

/// Parses the hostname index out of `node<index>-spark`.
pub fn node_index(hostname: &str) -> usize {
    hostname
        .strip_prefix("node")
        .and_then(|rest| rest.split('-').next())
        .and_then(|index| index.parse().ok())
        .unwrap_or_else(|| panic!("unexpected hostname {hostname}"))
}

pub fn configurator(executor: FakeExecutor) -> TrustConfigurator<FakeExecutor> {
    TrustConfigurator::new(executor, "cluster_key")
        .with_retry(RetryPolicy::new(2, Backoff::Fixed(Duration::from_millis(1))))
}
