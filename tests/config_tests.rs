//! Tests for configuration and request validation.

#[path = "common/test_constants.rs"]
mod test_constants;

use ecsfleet::request::DEFAULT_BANDWIDTH_MBPS;
use ecsfleet::test_support::{huawei_config, ssh_config};
use ecsfleet::{ConfigError, HuaweiConfig, RequestError, ResourceRequest, SshConfig};
use rstest::*;

use test_constants::{TEST_RUN_NUMBER, TEST_TASK_TYPE, sample_request};

#[fixture]
fn valid_config() -> HuaweiConfig {
    huawei_config()
}

#[rstest]
fn config_validation_rejects_missing_secret_with_actionable_error(valid_config: HuaweiConfig) {
    let cfg = HuaweiConfig {
        secret_key: String::new(),
        ..valid_config
    };

    let error = cfg.validate().expect_err("secret is required");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error");
    };
    assert!(
        message.contains("HWC_SECRET_KEY"),
        "error should mention env var: {message}"
    );
    assert!(
        message.contains("ecsfleet.toml"),
        "error should mention config file: {message}"
    );
    assert!(
        message.contains("secret_key"),
        "error should mention TOML key: {message}"
    );
}

#[rstest]
#[case::access_key(|cfg: &mut HuaweiConfig| cfg.access_key.clear(), "HWC_ACCESS_KEY", "access_key")]
#[case::region(|cfg: &mut HuaweiConfig| cfg.region = String::from("  "), "HWC_REGION", "region")]
#[case::hcloud_bin(|cfg: &mut HuaweiConfig| cfg.hcloud_bin.clear(), "HWC_HCLOUD_BIN", "hcloud_bin")]
#[case::project_id(|cfg: &mut HuaweiConfig| cfg.project_id = Some(String::new()), "HWC_PROJECT_ID", "project_id")]
fn config_validation_produces_actionable_errors(
    valid_config: HuaweiConfig,
    #[case] mutate: fn(&mut HuaweiConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    mutate(&mut cfg);

    let message = cfg.validate().expect_err("validation should fail").to_string();

    assert!(message.contains(env_var), "error should mention {env_var}: {message}");
    assert!(message.contains(toml_key), "error should mention {toml_key}: {message}");
    assert!(message.contains("ecsfleet.toml"), "error should mention config file: {message}");
}

#[rstest]
fn config_accepts_optional_project(valid_config: HuaweiConfig) {
    let cfg = HuaweiConfig {
        project_id: Some(String::from("0123456789abcdef")),
        ..valid_config
    };
    assert_eq!(cfg.validate(), Ok(()));
}

#[rstest]
fn default_zone_is_first_zone_of_region(valid_config: HuaweiConfig) {
    let cfg = HuaweiConfig {
        region: String::from("cn-north-4"),
        ..valid_config
    };
    assert_eq!(cfg.default_zone(), "cn-north-4a");
}

#[test]
fn ssh_config_fixture_is_valid() {
    let cfg: SshConfig = ssh_config();
    assert_eq!(cfg.validate(), Ok(()));
}

#[test]
fn ssh_config_rejects_missing_binary() {
    let cfg = SshConfig {
        scp_bin: String::new(),
        ..ssh_config()
    };
    let message = cfg.validate().expect_err("scp is required").to_string();
    assert!(message.contains("ECSFLEET_SSH_SCP_BIN"), "{message}");
    assert!(message.contains("[ssh]"), "{message}");
}

#[test]
fn request_builder_applies_defaults_and_trims() {
    let request = ResourceRequest::builder()
        .instance_type(" s6.large.2 ")
        .zone("ap-southeast-3a")
        .image_id("img")
        .key_pair("key")
        .security_group_id("sg")
        .subnet_id("subnet")
        .vpc_id("vpc")
        .run_number(TEST_RUN_NUMBER)
        .task_type(TEST_TASK_TYPE)
        .actor("bot")
        .build()
        .expect("request should build");

    assert_eq!(request.count, 1);
    assert_eq!(request.timeout_hours, 1);
    assert_eq!(request.bandwidth_mbps, DEFAULT_BANDWIDTH_MBPS);
    assert!(!request.use_public_ip);
    assert_eq!(request.instance_type, "s6.large.2");
}

#[rstest]
#[case::vpc("vpc_id")]
#[case::actor("actor")]
fn request_rejects_empty_fields(#[case] field: &str) {
    let mut request = sample_request(2, false);
    match field {
        "vpc_id" => request.vpc_id.clear(),
        _ => request.actor.clear(),
    }
    assert_eq!(
        request.validate(),
        Err(RequestError::Validation(field.to_owned()))
    );
}

#[test]
fn request_rejects_zero_bandwidth_only_with_public_ip() {
    let mut request = sample_request(1, false);
    request.bandwidth_mbps = 0;
    assert_eq!(request.validate(), Ok(()));

    request.use_public_ip = true;
    let err = request.validate().expect_err("bandwidth is required");
    assert_eq!(err.to_string(), "bandwidth_mbps must be greater than zero");
}

#[test]
fn request_names_follow_batch_conventions() {
    let request = sample_request(3, true);
    assert_eq!(request.instance_name(1), "42-spark-node1-timeout2-ci-bot");
    assert_eq!(request.hostname(2), "node2-spark");
    assert_eq!(request.batch_stem(), "42_spark");
    assert_eq!(request.batch_tag(), "42-spark");
}
