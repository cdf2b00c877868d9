//! SSH client settings loaded via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::config::ConfigError;

/// Default private key path for the cluster-wide key pair.
pub const DEFAULT_LOCAL_KEY_PATH: &str = "~/.ssh/cluster_key";

/// Default file name of the cluster key inside the remote `~/.ssh`.
pub const DEFAULT_REMOTE_KEY_NAME: &str = "cluster_key";

/// SSH, SCP, and key settings shared by the trust configurator and the
/// remote command runner.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "ECSFLEET_SSH",
    discovery(
        app_name = "ecsfleet",
        env_var = "ECSFLEET_CONFIG_PATH",
        config_file_name = "ecsfleet.toml",
        dotfile_name = ".ecsfleet.toml",
        project_file_name = "ecsfleet.toml"
    )
)]
pub struct SshConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Path to the `ssh-keygen` executable.
    #[ortho_config(default = "ssh-keygen".to_owned())]
    pub ssh_keygen_bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// Remote SSH port.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Whether to force batch mode for SSH to avoid password prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking; ephemeral hosts default to off.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null` for ephemeral hosts.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Seconds the client waits for a TCP connection.
    #[ortho_config(default = 10)]
    pub connect_timeout_secs: u64,
    /// Local path of the cluster private key. Supports tilde expansion.
    #[ortho_config(default = DEFAULT_LOCAL_KEY_PATH.to_owned())]
    pub local_key_path: String,
    /// File name used for the cluster key inside the remote `~/.ssh`.
    #[ortho_config(default = DEFAULT_REMOTE_KEY_NAME.to_owned())]
    pub remote_key_name: String,
}

impl SshConfig {
    /// Loads configuration using defaults, configuration files, and
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("ecsfleet")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when any required field is
    /// empty, naming the environment variable and TOML key to set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("ssh_bin", &self.ssh_bin),
            ("scp_bin", &self.scp_bin),
            ("ssh_keygen_bin", &self.ssh_keygen_bin),
            ("ssh_user", &self.ssh_user),
            ("local_key_path", &self.local_key_path),
            ("remote_key_name", &self.remote_key_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "missing {field}: set ECSFLEET_SSH_{} or add {field} to [ssh] in ecsfleet.toml",
                    field.to_uppercase()
                )));
            }
        }
        if self.remote_key_name.contains('/') {
            return Err(ConfigError::MissingField(String::from(
                "remote_key_name must be a bare file name: fix ECSFLEET_SSH_REMOTE_KEY_NAME or remote_key_name in [ssh] in ecsfleet.toml",
            )));
        }
        Ok(())
    }
}
