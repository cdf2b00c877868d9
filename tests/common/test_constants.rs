//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

use ecsfleet::ResourceRequest;

/// CI run number used by sample batches.
pub const TEST_RUN_NUMBER: &str = "42";

/// Task type used by sample batches.
pub const TEST_TASK_TYPE: &str = "spark";

/// Actor recorded on sample batches.
pub const TEST_ACTOR: &str = "ci-bot";

/// Flavour used by sample batches.
pub const TEST_FLAVOR: &str = "s6.large.2";

/// Availability zone used by sample batches.
pub const TEST_ZONE: &str = "ap-southeast-3a";

/// Builds a valid request for `count` instances with placeholder network
/// identifiers.
pub fn sample_request(count: usize, use_public_ip: bool) -> ResourceRequest {
    ResourceRequest::builder()
        .count(count)
        .instance_type(TEST_FLAVOR)
        .zone(TEST_ZONE)
        .image_id("img-ubuntu")
        .key_pair("ci-key")
        .security_group_id("sg-1")
        .subnet_id("subnet-1")
        .vpc_id("vpc-1")
        .run_number(TEST_RUN_NUMBER)
        .task_type(TEST_TASK_TYPE)
        .timeout_hours(2)
        .actor(TEST_ACTOR)
        .use_public_ip(use_public_ip)
        .build()
        .unwrap_or_else(|err| panic!("sample request should be valid: {err}"))
}
