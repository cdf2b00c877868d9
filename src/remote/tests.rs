//! Unit tests for SSH and SCP argument construction.

use rstest::{fixture, rstest};

use super::*;
use crate::test_support::{ScriptedRunner, ssh_config};

#[fixture]
fn runner() -> ScriptedRunner {
    ScriptedRunner::new()
}

fn executor(runner: &ScriptedRunner) -> SshExecutor<ScriptedRunner> {
    SshExecutor::new(ssh_config(), runner.clone()).expect("config should validate")
}

fn target() -> SshTarget {
    SshTarget::new("203.0.113.1", Some(Utf8Path::new("/keys/bootstrap")))
}

fn last_command(runner: &ScriptedRunner) -> String {
    runner
        .invocations()
        .pop()
        .expect("a command should be invoked")
        .command_string()
}

#[rstest]
#[tokio::test]
async fn run_builds_non_interactive_ssh_invocation(runner: ScriptedRunner) {
    runner.push_output(Some(3), "partial\n", "boom\n");

    let output = executor(&runner)
        .run(&target(), "cat /etc/hosts")
        .await
        .expect("remote failures are reported as output");

    assert_eq!(
        output,
        RemoteCommandOutput {
            exit_code: Some(3),
            stdout: String::from("partial\n"),
            stderr: String::from("boom\n"),
        }
    );
    assert!(!output.is_success());
    assert_eq!(
        last_command(&runner),
        "ssh -p 22 -i /keys/bootstrap -o BatchMode=yes -o StrictHostKeyChecking=no \
         -o UserKnownHostsFile=/dev/null -o ConnectTimeout=10 root@203.0.113.1 cat /etc/hosts"
    );
}

#[rstest]
#[tokio::test]
async fn connection_failure_maps_to_unreachable(runner: ScriptedRunner) {
    runner.push_output(Some(255), "", "ssh: connect to host 203.0.113.1 port 22: Connection timed out\n");

    let err = executor(&runner)
        .run(&target(), "true")
        .await
        .expect_err("exit 255 should be an error");

    assert_eq!(
        err,
        ExecError::Unreachable {
            host: String::from("203.0.113.1"),
            stderr: String::from("ssh: connect to host 203.0.113.1 port 22: Connection timed out"),
        }
    );
}

#[rstest]
#[tokio::test]
async fn upload_targets_remote_path_with_scp(runner: ScriptedRunner) {
    runner.push_success();

    executor(&runner)
        .upload(&target(), Utf8Path::new("/keys/cluster_key"), "/tmp/staged")
        .await
        .expect("upload should succeed");

    assert_eq!(
        last_command(&runner),
        "scp -q -P 22 -i /keys/bootstrap -o BatchMode=yes -o StrictHostKeyChecking=no \
         -o UserKnownHostsFile=/dev/null -o ConnectTimeout=10 /keys/cluster_key \
         root@203.0.113.1:/tmp/staged"
    );
}

#[rstest]
#[tokio::test]
async fn download_failure_keeps_scp_status(runner: ScriptedRunner) {
    runner.push_output(Some(1), "", "scp: /root/job.log: No such file or directory\n");

    let err = executor(&runner)
        .download(&target(), "/root/job.log", Utf8Path::new("logs/node0.log"))
        .await
        .expect_err("download should fail");

    assert!(matches!(
        err,
        ExecError::CommandFailure { ref program, status: Some(1), .. } if program == "scp"
    ));
    let invocation = runner.invocations().pop().expect("scp should be invoked");
    assert!(invocation.has_arg("root@203.0.113.1:/root/job.log"));
    assert!(invocation.has_arg("logs/node0.log"));
}

#[rstest]
#[tokio::test]
async fn optional_options_follow_configuration(runner: ScriptedRunner) {
    let mut config = ssh_config();
    config.ssh_batch_mode = false;
    config.ssh_strict_host_key_checking = true;
    config.ssh_known_hosts_file = String::new();
    config.connect_timeout_secs = 0;
    config.ssh_user = String::from("ubuntu");
    config.ssh_port = 2222;
    runner.push_success();
    let ssh = SshExecutor::new(config, runner.clone()).expect("config should validate");

    ssh.run(&SshTarget::new("10.0.0.1", None), "hostname")
        .await
        .expect("command should run");

    assert_eq!(last_command(&runner), "ssh -p 2222 ubuntu@10.0.0.1 hostname");
}

#[rstest]
#[case("ssh_user")]
#[case("remote_key_name")]
#[case("local_key_path")]
fn empty_required_field_is_rejected(#[case] field: &str) {
    let mut config = ssh_config();
    match field {
        "ssh_user" => config.ssh_user = String::from("  "),
        "remote_key_name" => config.remote_key_name = String::new(),
        _ => config.local_key_path = String::new(),
    }

    let err = config.validate().expect_err("validation should fail");

    assert!(matches!(err, ConfigError::MissingField(ref message) if message.contains(field)));
    assert!(err.to_string().contains(&format!("ECSFLEET_SSH_{}", field.to_uppercase())));
}

#[test]
fn remote_key_name_must_not_contain_a_path() {
    let mut config = ssh_config();
    config.remote_key_name = String::from("keys/cluster");
    assert!(config.validate().is_err());
    assert!(SshExecutor::new(config, ScriptedRunner::new()).is_err());
}
