//! Command-line interface definitions for the `ecsfleet` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{ArgGroup, Args, Parser};

/// Image used when `--ami` is not given.
pub(crate) const DEFAULT_IMAGE_ID: &str = "04b5ea14-da35-47de-8467-66808dd62007";

/// Inventory directory used when `--cache-dir` is not given.
pub(crate) const DEFAULT_CACHE_DIR: &str = "./cache";

/// Top-level CLI for the `ecsfleet` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ecsfleet",
    about = "Provision ephemeral Huawei Cloud ECS clusters for CI and wire up SSH trust",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Allocate elastic IPs and create a batch of instances.
    #[command(name = "create", about = "Create a batch of instances and record its inventories")]
    Create(CreateCommand),
    /// Delete instances and release elastic IPs.
    #[command(name = "delete", about = "Delete instances and release elastic IPs")]
    Delete(DeleteCommand),
    /// Configure passwordless SSH between existing nodes.
    #[command(name = "trust", about = "Configure passwordless SSH between cluster nodes")]
    Trust(TrustCommand),
    /// Provision, configure, run a command, and tear everything down.
    #[command(name = "run", about = "Provision a cluster, run a command on it, and tear it down")]
    Run(RunCommand),
}

/// Batch description shared by `create` and `run`.
#[derive(Debug, Args)]
pub(crate) struct ProvisionArgs {
    /// VPC the instances join.
    #[arg(long, value_name = "ID")]
    pub(crate) vpc_id: String,
    /// Number of instances to create.
    #[arg(long = "num-instances", value_name = "N", default_value_t = 1)]
    pub(crate) count: usize,
    /// Flavour, for example `s6.large.2`.
    #[arg(long, value_name = "FLAVOR")]
    pub(crate) instance_type: String,
    /// Availability zone; defaults to `<region>a`.
    #[arg(long = "instance-zone", value_name = "ZONE")]
    pub(crate) zone: Option<String>,
    /// Image identifier.
    #[arg(long = "ami", value_name = "IMAGE_ID", default_value = DEFAULT_IMAGE_ID)]
    pub(crate) image_id: String,
    /// Cloud key pair injected into the instances.
    #[arg(long, value_name = "NAME")]
    pub(crate) key_pair: String,
    /// Security group attached to the instances.
    #[arg(long, value_name = "ID")]
    pub(crate) security_group_id: String,
    /// Subnet the instances attach to.
    #[arg(long, value_name = "ID")]
    pub(crate) subnet_id: String,
    /// CI run number used in names and tags.
    #[arg(long, value_name = "RUN")]
    pub(crate) run_number: String,
    /// Task type used in names, tags, and hostnames.
    #[arg(long, value_name = "TASK")]
    pub(crate) task_type: String,
    /// Hours before the provider terminates the instances.
    #[arg(long, value_name = "HOURS", default_value_t = 1)]
    pub(crate) timeout_hours: u32,
    /// Person or bot that requested the batch.
    #[arg(long, value_name = "NAME")]
    pub(crate) actor: String,
    /// Allocate an elastic IP for every instance.
    #[arg(long = "use-ip")]
    pub(crate) use_public_ip: bool,
    /// Elastic IP bandwidth in Mbit/s.
    #[arg(long, value_name = "MBPS", default_value_t = 5)]
    pub(crate) bandwidth: u32,
    /// Directory receiving the batch inventories.
    #[arg(long, value_name = "DIR", default_value = DEFAULT_CACHE_DIR)]
    pub(crate) cache_dir: String,
}

/// Arguments for the `ecsfleet create` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct CreateCommand {
    /// Batch to create.
    #[command(flatten)]
    pub(crate) provision: ProvisionArgs,
    /// Configure cluster trust with this key once the instances are ready.
    #[arg(long, value_name = "PATH")]
    pub(crate) bootstrap_key: Option<String>,
}

/// Arguments for the `ecsfleet delete` subcommand.
#[derive(Debug, Parser)]
#[command(group(
    ArgGroup::new("targets")
        .required(true)
        .multiple(true)
        .args(["server_ids", "instances_file", "eip_ids", "eips_file"])
))]
pub(crate) struct DeleteCommand {
    /// Instance ids to delete (comma separated or repeated).
    #[arg(long, value_name = "ID", value_delimiter = ',', num_args = 1..)]
    pub(crate) server_ids: Vec<String>,
    /// Instance inventory whose instances should be deleted.
    #[arg(long, value_name = "PATH")]
    pub(crate) instances_file: Option<String>,
    /// Elastic IP ids to release (comma separated or repeated).
    #[arg(long, value_name = "ID", value_delimiter = ',', num_args = 1..)]
    pub(crate) eip_ids: Vec<String>,
    /// Elastic IP inventory whose addresses should be released.
    #[arg(long, value_name = "PATH")]
    pub(crate) eips_file: Option<String>,
}

/// Arguments for the `ecsfleet trust` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct TrustCommand {
    /// Cluster-info file listing `hostname public_ip server_id private_ip`.
    #[arg(long, value_name = "PATH", conflicts_with = "hosts", required_unless_present = "hosts")]
    pub(crate) cluster_info: Option<String>,
    /// Bare host addresses; `/etc/hosts` is left untouched in this mode.
    #[arg(long, value_name = "HOST", value_delimiter = ',', num_args = 1..)]
    pub(crate) hosts: Vec<String>,
    /// Key accepted by the nodes.
    #[arg(long, value_name = "PATH")]
    pub(crate) bootstrap_key: String,
    /// Remote user; overrides the configured SSH user.
    #[arg(long, value_name = "USER")]
    pub(crate) user: Option<String>,
    /// Local cluster private key; overrides the configured path.
    #[arg(long, value_name = "PATH")]
    pub(crate) local_key: Option<String>,
    /// File name of the cluster key inside the remote `~/.ssh`.
    #[arg(long, value_name = "NAME")]
    pub(crate) remote_key_name: Option<String>,
    /// Check SSH between nodes after configuration.
    #[arg(long)]
    pub(crate) verify: bool,
}

/// Arguments for the `ecsfleet run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Batch to provision.
    #[command(flatten)]
    pub(crate) provision: ProvisionArgs,
    /// Key accepted by fresh instances.
    #[arg(long, value_name = "PATH")]
    pub(crate) bootstrap_key: String,
    /// Remote file collected from every node after the command.
    #[arg(long, value_name = "REMOTE_PATH")]
    pub(crate) download: Option<String>,
    /// Local directory receiving collected files.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub(crate) download_to: String,
    /// Run the command even when some nodes failed trust configuration.
    #[arg(long)]
    pub(crate) allow_degraded: bool,
    /// Command to execute on the first node (use -- to separate flags).
    #[arg(required = true, trailing_var_arg = true)]
    pub(crate) command: Vec<String>,
}
