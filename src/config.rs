//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default Huawei Cloud region used when none is configured.
pub const DEFAULT_REGION: &str = "ap-southeast-3";

/// Huawei Cloud credentials and CLI settings derived from environment
/// variables, configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HWC",
    discovery(
        app_name = "ecsfleet",
        env_var = "ECSFLEET_CONFIG_PATH",
        config_file_name = "ecsfleet.toml",
        dotfile_name = ".ecsfleet.toml",
        project_file_name = "ecsfleet.toml"
    )
)]
pub struct HuaweiConfig {
    /// Access key (AK) passed to the `hcloud` CLI.
    pub access_key: String,
    /// Secret key (SK) passed to the `hcloud` CLI.
    pub secret_key: String,
    /// Region every request targets. Defaults to [`DEFAULT_REGION`].
    #[ortho_config(default = DEFAULT_REGION.to_owned())]
    pub region: String,
    /// Project identifier; only needed when the account has several projects
    /// in the same region.
    pub project_id: Option<String>,
    /// Path to the KooCLI `hcloud` executable.
    #[ortho_config(default = "hcloud".to_owned())]
    pub hcloud_bin: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl HuaweiConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [huawei] in ecsfleet.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("ecsfleet")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the availability zone used when the caller does not name
    /// one: the first zone of the configured region.
    #[must_use]
    pub fn default_zone(&self) -> String {
        format!("{}a", self.region.trim())
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.access_key,
            &FieldMetadata::new("Huawei Cloud access key", "HWC_ACCESS_KEY", "access_key"),
        )?;
        Self::require_field(
            &self.secret_key,
            &FieldMetadata::new("Huawei Cloud secret key", "HWC_SECRET_KEY", "secret_key"),
        )?;
        Self::require_field(
            &self.region,
            &FieldMetadata::new("region", "HWC_REGION", "region"),
        )?;
        Self::require_field(
            &self.hcloud_bin,
            &FieldMetadata::new("hcloud executable", "HWC_HCLOUD_BIN", "hcloud_bin"),
        )?;
        if self
            .project_id
            .as_deref()
            .is_some_and(|value| value.trim().is_empty())
        {
            return Err(ConfigError::MissingField(String::from(
                "empty project ID: unset HWC_PROJECT_ID or give project_id a value in [huawei] in ecsfleet.toml",
            )));
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
