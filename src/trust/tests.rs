//! Unit tests for trust configuration rendering, node sequencing, and key
//! handling.

use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::retry::Backoff;
use crate::test_support::{FakeExecutor, RemoteCall, ScriptedRunner};

#[fixture]
fn nodes() -> Vec<ClusterNode> {
    (0..3)
        .map(|index| ClusterNode {
            hostname: format!("node{index}-spark"),
            public_ip: Some(format!("203.0.113.{}", index + 1)),
            private_ip: format!("10.0.0.{}", index + 1),
        })
        .collect()
}

fn cluster_key() -> KeyPair {
    KeyPair {
        private_key_path: Utf8PathBuf::from("/keys/cluster_key"),
        public_key: String::from("ssh-rsa AAAAcluster ecsfleet-cluster"),
    }
}

fn configurator(executor: FakeExecutor) -> TrustConfigurator<FakeExecutor> {
    TrustConfigurator::new(executor, "cluster_key")
        .with_retry(RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(1))))
}

fn temp_path(tmp: &TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(tmp.path().join(name))
        .unwrap_or_else(|path| panic!("temp path should be UTF-8: {}", path.display()))
}

#[rstest]
fn rewrite_hosts_replaces_cluster_entries_and_keeps_the_rest(nodes: Vec<ClusterNode>) {
    let existing = "127.0.0.1 localhost\n# managed by cloud-init\n10.9.9.9 node1-spark stale\n\n192.168.1.5 registry\n";

    let rewritten = rewrite_hosts(existing, &nodes);

    assert_eq!(
        rewritten,
        "127.0.0.1 localhost\n# managed by cloud-init\n\n192.168.1.5 registry\n\
         10.0.0.1\tnode0-spark\n10.0.0.2\tnode1-spark\n10.0.0.3\tnode2-spark\n"
    );
}

#[rstest]
fn rewrite_hosts_is_stable_when_applied_twice(nodes: Vec<ClusterNode>) {
    let once = rewrite_hosts("127.0.0.1 localhost\n", &nodes);
    assert_eq!(rewrite_hosts(&once, &nodes), once);
}

#[rstest]
fn rewrite_hosts_ignores_hostnames_in_comments(nodes: Vec<ClusterNode>) {
    let rewritten = rewrite_hosts("10.1.1.1 gateway # not node0-spark\n", &nodes);
    assert!(rewritten.starts_with("10.1.1.1 gateway # not node0-spark\n"));
}

#[rstest]
fn merging_a_key_twice_leaves_one_copy() {
    let key = "ssh-rsa AAAAcluster ecsfleet-cluster";
    let first = merge_authorized_key("ssh-ed25519 AAAAother admin", key)
        .expect("key should be appended");
    assert_eq!(first, "ssh-ed25519 AAAAother admin\nssh-rsa AAAAcluster ecsfleet-cluster\n");
    assert_eq!(merge_authorized_key(&first, key), None);
    assert_eq!(first.matches(key).count(), 1);
}

#[rstest]
fn ssh_client_config_uses_the_remote_key() {
    let config = ssh_client_config("cluster_key");
    assert!(config.starts_with("Host *\n"));
    for line in [
        "StrictHostKeyChecking no",
        "UserKnownHostsFile /dev/null",
        "LogLevel ERROR",
        "ConnectTimeout 5",
        "IdentityFile ~/.ssh/cluster_key",
    ] {
        assert!(config.contains(line), "missing {line}: {config}");
    }
}

#[rstest]
#[case("a b\nc\n", None, false, "printf '%s\\n' 'a b' c | tee /etc/x >/dev/null")]
#[case("x\n", Some("600"), true, "printf '%s\\n' x | sudo tee /etc/x >/dev/null && sudo chmod 600 /etc/x")]
#[case("", None, false, "printf '' | tee /etc/x >/dev/null")]
fn write_file_command_quotes_lines(
    #[case] contents: &str,
    #[case] mode: Option<&str>,
    #[case] sudo: bool,
    #[case] expected: &str,
) {
    assert_eq!(write_file_command("/etc/x", contents, mode, sudo), expected);
}

#[rstest]
fn connect_address_prefers_public_ip(nodes: Vec<ClusterNode>) {
    let node = nodes.first().expect("fixture has nodes");
    assert_eq!(node.connect_address(), "203.0.113.1");
    let private_only = ClusterNode {
        public_ip: None,
        ..node.clone()
    };
    assert_eq!(private_only.connect_address(), "10.0.0.1");
}

#[rstest]
#[tokio::test]
async fn configure_node_runs_every_step_in_order(nodes: Vec<ClusterNode>) {
    let executor = FakeExecutor::new().with_stdout("203.0.113.1", "cat /etc/hosts", "127.0.0.1 localhost\n");
    let trust = configurator(executor.clone());
    let node = nodes.first().expect("fixture has nodes");

    let configured = trust
        .configure_node(node, Utf8Path::new("/keys/bootstrap"), &cluster_key(), &nodes)
        .await;

    assert!(configured);
    let commands = executor.commands_for("203.0.113.1");
    assert_eq!(commands.first().map(String::as_str), Some("true"));
    assert_eq!(commands.get(1).map(String::as_str), Some("cat /etc/hosts"));
    let hosts_write = commands.get(2).expect("hosts write");
    assert!(hosts_write.contains("sudo tee /etc/hosts"));
    assert!(hosts_write.contains("'10.0.0.2\tnode1-spark'"));
    assert_eq!(
        commands.get(3).map(String::as_str),
        Some("mkdir -p ~/.ssh && chmod 700 ~/.ssh")
    );
    assert!(commands.iter().any(|command| command.ends_with("chmod 600 .ssh/cluster_key")));
    assert!(commands.iter().any(|command| command.ends_with("chmod 644 .ssh/cluster_key.pub")));
    assert!(commands.iter().any(|command| command.contains("tee .ssh/authorized_keys")));
    assert!(
        commands
            .last()
            .is_some_and(|command| command.contains("tee .ssh/config") && command.ends_with("chmod 600 .ssh/config"))
    );

    let uploads: Vec<String> = executor
        .calls_for("203.0.113.1")
        .into_iter()
        .filter_map(|call| match call {
            RemoteCall::Upload { local, remote, .. } => {
                assert!(remote.starts_with("/tmp/ecsfleet-"));
                Some(local)
            }
            _ => None,
        })
        .collect();
    assert_eq!(uploads, ["/keys/cluster_key", "/keys/cluster_key.pub"]);
}

#[rstest]
#[tokio::test]
async fn already_authorized_key_is_not_appended(nodes: Vec<ClusterNode>) {
    let executor = FakeExecutor::new().with_stdout(
        "203.0.113.1",
        "cat .ssh/authorized_keys 2>/dev/null || true",
        "ssh-rsa AAAAcluster ecsfleet-cluster\n",
    );
    let trust = configurator(executor.clone()).with_hosts_file(false);
    let node = nodes.first().expect("fixture has nodes");

    assert!(
        trust
            .configure_node(node, Utf8Path::new("/keys/bootstrap"), &cluster_key(), &nodes)
            .await
    );
    let commands = executor.commands_for("203.0.113.1");
    assert!(commands.contains(&String::from("chmod 600 .ssh/authorized_keys")));
    assert!(!commands.iter().any(|command| command.contains("tee .ssh/authorized_keys")));
    assert!(!commands.iter().any(|command| command.contains("/etc/hosts")));
}

#[rstest]
#[tokio::test]
async fn unreachable_node_fails_without_aborting_siblings(nodes: Vec<ClusterNode>) {
    let executor = FakeExecutor::new()
        .with_unreachable("203.0.113.2")
        .with_flaky("203.0.113.3", 1);
    let trust = configurator(executor.clone());

    let report = trust
        .configure_cluster(&nodes, Utf8Path::new("/keys/bootstrap"), &cluster_key())
        .await;

    assert!(!report.all_configured());
    assert_eq!(report.configured, ["node0-spark", "node2-spark"]);
    let failure = report.failed.first().expect("one failure");
    assert_eq!(failure.hostname, "node1-spark");
    assert!(failure.reason.contains("connectivity check"), "{}", failure.reason);
    assert_eq!(executor.commands_for("203.0.113.2").len(), 3);
}

#[rstest]
#[tokio::test]
async fn failing_step_is_reported_with_its_name(nodes: Vec<ClusterNode>) {
    let executor = FakeExecutor::new().with_failing_command("203.0.113.1", "mkdir -p ~/.ssh");
    let trust = configurator(executor);

    let report = trust
        .configure_cluster(
            nodes.get(..1).expect("fixture has nodes"),
            Utf8Path::new("/keys/bootstrap"),
            &cluster_key(),
        )
        .await;

    let failure = report.failed.first().expect("node0 fails");
    assert!(failure.reason.contains("prepare ~/.ssh"), "{}", failure.reason);
}

#[rstest]
#[tokio::test]
async fn verify_mesh_checks_two_peers_from_the_first_node(nodes: Vec<ClusterNode>) {
    let executor = FakeExecutor::new().with_failing_command("203.0.113.1", "node2-spark");
    let trust = configurator(executor.clone());

    let check = trust.verify_mesh(&nodes, Utf8Path::new("/keys/bootstrap")).await;

    assert_eq!(check.reachable, ["node1-spark"]);
    assert_eq!(check.unreachable, ["node2-spark"]);
    assert_eq!(
        executor.commands_for("203.0.113.1"),
        [
            "ssh -o BatchMode=yes node1-spark hostname",
            "ssh -o BatchMode=yes node2-spark hostname"
        ]
    );
}

#[tokio::test]
async fn existing_key_pair_is_reused() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let key = temp_path(&tmp, "cluster_key");
    std::fs::write(key.as_std_path(), "PRIVATE").unwrap_or_else(|err| panic!("write: {err}"));
    std::fs::write(format!("{key}.pub"), "ssh-rsa AAAAexisting\n")
        .unwrap_or_else(|err| panic!("write: {err}"));
    let runner = ScriptedRunner::new();

    let pair = ensure_local_key_pair(&runner, "ssh-keygen", &key)
        .await
        .unwrap_or_else(|err| panic!("existing key should load: {err}"));

    assert_eq!(pair.public_key, "ssh-rsa AAAAexisting");
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn missing_public_half_is_derived() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let key = temp_path(&tmp, "cluster_key");
    std::fs::write(key.as_std_path(), "PRIVATE").unwrap_or_else(|err| panic!("write: {err}"));
    let runner = ScriptedRunner::new();
    runner.push_stdout("ssh-rsa AAAAderived\n");

    let pair = ensure_local_key_pair(&runner, "ssh-keygen", &key)
        .await
        .unwrap_or_else(|err| panic!("public key should be derived: {err}"));

    assert_eq!(pair.public_key, "ssh-rsa AAAAderived");
    let invocation = runner.invocations().pop().expect("ssh-keygen was invoked");
    assert!(invocation.has_arg("-y"));
    let written = std::fs::read_to_string(format!("{key}.pub"))
        .unwrap_or_else(|err| panic!("read: {err}"));
    assert_eq!(written, "ssh-rsa AAAAderived\n");
}

#[tokio::test]
async fn key_generation_failure_is_reported() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let key = temp_path(&tmp, "keys/cluster_key");
    let runner = ScriptedRunner::new();
    runner.push_failure(1);

    let err = ensure_local_key_pair(&runner, "ssh-keygen", &key)
        .await
        .expect_err("generation should fail");

    assert!(matches!(err, TrustError::KeyGeneration(_)), "{err}");
    let invocation = runner.invocations().pop().expect("ssh-keygen was invoked");
    assert!(invocation.has_arg("rsa"));
    assert!(invocation.has_arg(key.as_str()));
}

#[cfg(unix)]
#[tokio::test]
async fn generated_key_pair_gets_restrictive_permissions() {
    use std::os::unix::fs::PermissionsExt;

    use crate::exec::ProcessCommandRunner;

    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let keygen = temp_path(&tmp, "fake-keygen");
    std::fs::write(
        keygen.as_std_path(),
        "#!/bin/sh\nfor last; do :; done\necho PRIVATE > \"$last\"\necho 'ssh-rsa AAAAgenerated ecsfleet-cluster' > \"$last.pub\"\n",
    )
    .unwrap_or_else(|err| panic!("write: {err}"));
    std::fs::set_permissions(keygen.as_std_path(), std::fs::Permissions::from_mode(0o755))
        .unwrap_or_else(|err| panic!("chmod: {err}"));
    let key = temp_path(&tmp, "nested/cluster_key");

    let pair = ensure_local_key_pair(&ProcessCommandRunner, keygen.as_str(), &key)
        .await
        .unwrap_or_else(|err| panic!("generation should succeed: {err}"));

    assert_eq!(pair.public_key, "ssh-rsa AAAAgenerated ecsfleet-cluster");
    let mode = |path: &str| {
        std::fs::metadata(path)
            .unwrap_or_else(|err| panic!("metadata: {err}"))
            .permissions()
            .mode()
            & 0o777
    };
    assert_eq!(mode(key.as_str()), 0o600);
    assert_eq!(mode(pair.public_key_path().as_str()), 0o644);
}

#[cfg(unix)]
#[tokio::test]
async fn second_ensure_reuses_the_generated_key_pair() {
    use std::os::unix::fs::PermissionsExt;

    use crate::exec::ProcessCommandRunner;

    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let keygen = temp_path(&tmp, "fake-keygen");
    let calls = temp_path(&tmp, "keygen-calls");
    std::fs::write(
        keygen.as_std_path(),
        format!(
            "#!/bin/sh\necho run >> '{calls}'\nfor last; do :; done\necho \"PRIVATE $$\" > \"$last\"\necho \"ssh-rsa AAAA$$ ecsfleet-cluster\" > \"$last.pub\"\n"
        ),
    )
    .unwrap_or_else(|err| panic!("write: {err}"));
    std::fs::set_permissions(keygen.as_std_path(), std::fs::Permissions::from_mode(0o755))
        .unwrap_or_else(|err| panic!("chmod: {err}"));
    let key = temp_path(&tmp, "cluster_key");
    let read = |path: &Utf8PathBuf| {
        std::fs::read_to_string(path.as_std_path()).unwrap_or_else(|err| panic!("read: {err}"))
    };

    let first = ensure_local_key_pair(&ProcessCommandRunner, keygen.as_str(), &key)
        .await
        .unwrap_or_else(|err| panic!("generation should succeed: {err}"));
    let private_after_first = read(&key);
    let second = ensure_local_key_pair(&ProcessCommandRunner, keygen.as_str(), &key)
        .await
        .unwrap_or_else(|err| panic!("reuse should succeed: {err}"));

    assert_eq!(first, second);
    assert_eq!(read(&key), private_after_first);
    assert_eq!(read(&first.public_key_path()).trim(), second.public_key);
    assert_eq!(read(&calls).lines().count(), 1);
}
