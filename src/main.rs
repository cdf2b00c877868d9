//! Binary entry point for the `ecsfleet` CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use shell_escape::unix::escape;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ecsfleet::{
    ClusterNode, ConfigError, HcloudClient, HuaweiConfig, InventoryError, KeySource,
    Orchestrator, ProcessCommandRunner, RequestError, ResourceRequest, RunError, RunPlan,
    SshConfig, SshExecutor, TaskRunner, TeardownReport, TrustConfigurator, TrustError,
    read_cluster_info, read_eip_ids, read_instances,
};

mod cli;

use cli::{Cli, CreateCommand, DeleteCommand, ProvisionArgs, RunCommand, TrustCommand};

type ProcessTaskRunner = TaskRunner<
    HcloudClient<ProcessCommandRunner>,
    SshExecutor<ProcessCommandRunner>,
    ProcessCommandRunner,
>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),
    #[error("inventory error: {0}")]
    Inventory(#[from] InventoryError),
    #[error("cluster key pair unavailable: {0}")]
    KeyPair(#[from] TrustError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("{0}")]
    Incomplete(String),
    #[error("remote command terminated without an exit status")]
    MissingExitCode,
    #[error("invalid command argument: {0}")]
    InvalidCommand(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Create(command) => create_command(&command).await,
        Cli::Delete(command) => delete_command(command).await,
        Cli::Trust(command) => trust_command(command).await,
        Cli::Run(command) => run_command(command).await,
    }
}

async fn create_command(args: &CreateCommand) -> Result<i32, CliError> {
    let huawei = HuaweiConfig::load_without_cli_args()?;
    let request = build_request(&args.provision, &huawei)?;
    let runner = task_runner(huawei, SshConfig::load_without_cli_args()?, &args.provision.cache_dir)?;

    let provisioned = runner.provision(&request).await?;
    for failure in &provisioned.report.failures {
        warn!(
            index = failure.index,
            server_id = failure.server_id.as_deref().unwrap_or("-"),
            reason = %failure.reason,
            "instance not ready and not deleted; it is listed in the instance inventory"
        );
    }

    if let Some(key) = &args.bootstrap_key {
        let nodes = provisioned.nodes(&request.task_type);
        let report = runner.configure(&nodes, Utf8Path::new(key)).await?;
        if !report.all_configured() {
            let failed: Vec<&str> = report
                .failed
                .iter()
                .map(|failure| failure.hostname.as_str())
                .collect();
            return Err(CliError::Incomplete(format!(
                "trust configuration failed on {}; instances were kept",
                failed.join(", ")
            )));
        }
    }
    Ok(0)
}

async fn delete_command(args: DeleteCommand) -> Result<i32, CliError> {
    let mut server_ids = args.server_ids;
    if let Some(path) = &args.instances_file {
        server_ids.extend(
            read_instances(Utf8Path::new(path))?
                .into_iter()
                .map(|record| record.id),
        );
    }
    let mut eip_ids = args.eip_ids;
    if let Some(path) = &args.eips_file {
        eip_ids.extend(read_eip_ids(Utf8Path::new(path))?);
    }

    let cloud = HcloudClient::with_process_runner(HuaweiConfig::load_without_cli_args()?)?;
    let orchestrator = Orchestrator::new(cloud);
    let mut report = TeardownReport::default();
    if !server_ids.is_empty() {
        report.instances = orchestrator.delete_instances(&server_ids).await;
    }
    if !eip_ids.is_empty() {
        report.eips = orchestrator.delete_eips(&eip_ids).await;
    }

    if report.is_clean() {
        return Ok(0);
    }
    Err(CliError::Incomplete(format!(
        "failed to delete: {}",
        report.leftovers().join(", ")
    )))
}

async fn trust_command(args: TrustCommand) -> Result<i32, CliError> {
    let mut ssh = SshConfig::load_without_cli_args()?;
    if let Some(user) = args.user {
        ssh.ssh_user = user;
    }
    if let Some(local_key) = args.local_key {
        ssh.local_key_path = local_key;
    }
    if let Some(remote_key_name) = args.remote_key_name {
        ssh.remote_key_name = remote_key_name;
    }

    let (nodes, manage_hosts) = match &args.cluster_info {
        Some(path) => {
            let cluster = read_cluster_info(Utf8Path::new(path))?;
            (cluster.nodes(), true)
        }
        None => (args.hosts.iter().map(|host| bare_node(host)).collect(), false),
    };
    if nodes.is_empty() {
        return Err(CliError::Incomplete(String::from("no nodes to configure")));
    }

    let key = KeySource::new(ProcessCommandRunner, ssh.ssh_keygen_bin.clone(), &ssh.local_key_path)
        .ensure()
        .await?;
    let remote_key_name = ssh.remote_key_name.clone();
    let executor = SshExecutor::with_process_runner(ssh)?;
    let trust = TrustConfigurator::new(executor, remote_key_name).with_hosts_file(manage_hosts);
    let bootstrap_key = Utf8Path::new(&args.bootstrap_key);

    let report = trust.configure_cluster(&nodes, bootstrap_key, &key).await;
    if !report.all_configured() {
        let failed: Vec<&str> = report
            .failed
            .iter()
            .map(|failure| failure.hostname.as_str())
            .collect();
        return Err(CliError::Incomplete(format!(
            "trust configuration failed on {}",
            failed.join(", ")
        )));
    }

    if args.verify {
        let check = trust.verify_mesh(&nodes, bootstrap_key).await;
        if !check.unreachable.is_empty() {
            return Err(CliError::Incomplete(format!(
                "mesh SSH failed to {}",
                check.unreachable.join(", ")
            )));
        }
        info!(peers = check.reachable.len(), "mesh SSH verified");
    }
    Ok(0)
}

async fn run_command(args: RunCommand) -> Result<i32, CliError> {
    validate_command_args(&args.command)?;
    let remote_command = render_remote_command(&args.command);

    let huawei = HuaweiConfig::load_without_cli_args()?;
    let request = build_request(&args.provision, &huawei)?;
    let runner = task_runner(huawei, SshConfig::load_without_cli_args()?, &args.provision.cache_dir)?;

    let base = RunPlan::new(request, args.bootstrap_key, remote_command)
        .with_allow_degraded(args.allow_degraded);
    let plan = match args.download {
        Some(remote) => base.with_download(remote, args.download_to),
        None => base,
    };
    let outcome = runner.execute(&plan).await?;

    io::stdout().write_all(outcome.output.stdout.as_bytes()).ok();
    io::stderr().write_all(outcome.output.stderr.as_bytes()).ok();
    outcome.output.exit_code.ok_or(CliError::MissingExitCode)
}

fn build_request(args: &ProvisionArgs, huawei: &HuaweiConfig) -> Result<ResourceRequest, RequestError> {
    let zone = args.zone.clone().unwrap_or_else(|| huawei.default_zone());
    ResourceRequest::builder()
        .count(args.count)
        .instance_type(args.instance_type.as_str())
        .zone(zone)
        .image_id(args.image_id.as_str())
        .key_pair(args.key_pair.as_str())
        .security_group_id(args.security_group_id.as_str())
        .subnet_id(args.subnet_id.as_str())
        .vpc_id(args.vpc_id.as_str())
        .run_number(args.run_number.as_str())
        .task_type(args.task_type.as_str())
        .timeout_hours(args.timeout_hours)
        .actor(args.actor.as_str())
        .use_public_ip(args.use_public_ip)
        .bandwidth_mbps(args.bandwidth)
        .build()
}

fn task_runner(
    huawei: HuaweiConfig,
    ssh: SshConfig,
    cache_dir: &str,
) -> Result<ProcessTaskRunner, CliError> {
    let key = KeySource::new(ProcessCommandRunner, ssh.ssh_keygen_bin.clone(), &ssh.local_key_path);
    let remote_key_name = ssh.remote_key_name.clone();
    let orchestrator = Orchestrator::new(HcloudClient::with_process_runner(huawei)?);
    let trust = TrustConfigurator::new(SshExecutor::with_process_runner(ssh)?, remote_key_name);
    Ok(TaskRunner::new(orchestrator, trust, key, cache_dir))
}

fn bare_node(host: &str) -> ClusterNode {
    ClusterNode {
        hostname: host.to_owned(),
        public_ip: None,
        private_ip: host.to_owned(),
    }
}

fn render_remote_command(args: &[String]) -> String {
    args.iter()
        .map(|arg| escape(arg.as_str().into()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn validate_command_args(args: &[String]) -> Result<(), CliError> {
    for arg in args {
        if arg
            .chars()
            .any(|ch| matches!(ch, '\u{0000}'..='\u{001F}' | '\u{007F}'))
        {
            return Err(CliError::InvalidCommand(String::from(concat!(
                "command arguments must not contain control characters (ASCII ",
                "0x00-0x1F or 0x7F, e.g. newline, carriage return, tab, NUL)"
            ))));
        }
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
