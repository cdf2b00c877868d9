//! BDD scenarios for cluster trust configuration.

use rstest_bdd_macros::scenario;

use super::test_helpers::{TrustContext, trust_context};

#[scenario(
    path = "tests/features/cluster_trust.feature",
    name = "Configure trust across every node of an inventory"
)]
fn scenario_configure_every_node(trust_context: TrustContext) {
    drop(trust_context);
}

#[scenario(
    path = "tests/features/cluster_trust.feature",
    name = "Report an unreachable node without aborting the others"
)]
fn scenario_unreachable_node(trust_context: TrustContext) {
    drop(trust_context);
}

#[scenario(
    path = "tests/features/cluster_trust.feature",
    name = "Skip malformed inventory lines"
)]
fn scenario_malformed_lines(trust_context: TrustContext) {
    drop(trust_context);
}
