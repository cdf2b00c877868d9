//! [`CloudClient`] backed by the Huawei Cloud `hcloud` CLI (KooCLI).
//!
//! Every call is one CLI invocation with JSON output. Request signing and
//! transport stay inside the CLI.

use std::ffi::OsString;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{ConfigError, HuaweiConfig};
use crate::exec::{CommandOutput, CommandRunner, ExecError, ProcessCommandRunner};

use super::{CloudClient, CloudError, CloudFuture, EipHandle, JobStatus, ServerDetail, ServerSpec};

mod response;

use response::{
    CreatePublicipResponse, CreateServersResponse, DeleteServersResponse, ErrorBody,
    ShowJobResponse, ShowServerResponse,
};

/// Elastic IP type requested for every allocation.
pub const EIP_TYPE: &str = "5_bgp";

/// Root volume type requested for every server.
pub const ROOT_VOLUME_TYPE: &str = "SSD";

/// Environment variable carrying the access key to `hcloud`.
pub const ACCESS_KEY_ENV: &str = "HUAWEICLOUD_SDK_AK";

/// Environment variable carrying the secret key to `hcloud`.
pub const SECRET_KEY_ENV: &str = "HUAWEICLOUD_SDK_SK";

/// Cloud client that shells out to `hcloud`.
#[derive(Clone, Debug)]
pub struct HcloudClient<R: CommandRunner> {
    config: HuaweiConfig,
    runner: R,
}

impl HcloudClient<ProcessCommandRunner> {
    /// Creates a client wired to the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when validation fails.
    pub fn with_process_runner(config: HuaweiConfig) -> Result<Self, ConfigError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> HcloudClient<R> {
    /// Creates a client using the provided configuration and runner.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when validation fails.
    pub fn new(config: HuaweiConfig, runner: R) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    fn base_args(&self, service: &str, operation: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(service),
            OsString::from(operation),
            OsString::from(format!("--cli-region={}", self.config.region)),
        ];
        if let Some(project_id) = &self.config.project_id {
            args.push(OsString::from(format!("--cli-project-id={project_id}")));
        }
        args.push(OsString::from("--cli-output=json"));
        args
    }

    /// Credentials travel in the child's environment, never on its command
    /// line.
    fn credentials(&self) -> [(OsString, OsString); 2] {
        [
            (
                OsString::from(ACCESS_KEY_ENV),
                OsString::from(&self.config.access_key),
            ),
            (
                OsString::from(SECRET_KEY_ENV),
                OsString::from(&self.config.secret_key),
            ),
        ]
    }

    async fn execute(&self, args: &[OsString]) -> Result<CommandOutput, ExecError> {
        let env = self.credentials();
        self.runner
            .run_with_env(&self.config.hcloud_bin, args, &env)
            .await
    }

    fn create_eip_args(&self, name: &str, bandwidth_mbps: u32) -> Vec<OsString> {
        let mut args = self.base_args("EIP", "CreatePublicip");
        args.extend(
            [
                format!("--publicip.type={EIP_TYPE}"),
                String::from("--bandwidth.share_type=PER"),
                format!("--bandwidth.name={name}"),
                format!("--bandwidth.size={bandwidth_mbps}"),
            ]
            .map(OsString::from),
        );
        args
    }

    fn create_server_args(&self, spec: &ServerSpec) -> Vec<OsString> {
        let mut args = self.base_args("ECS", "CreatePostPaidServers");
        let mut params = vec![
            format!("--server.name={}", spec.name),
            format!("--server.flavorRef={}", spec.flavor),
            format!("--server.imageRef={}", spec.image_id),
            format!("--server.vpcid={}", spec.vpc_id),
            format!("--server.nics.1.subnet_id={}", spec.subnet_id),
            format!("--server.root_volume.volumetype={ROOT_VOLUME_TYPE}"),
            format!("--server.key_name={}", spec.key_pair),
            format!("--server.availability_zone={}", spec.zone),
            format!("--server.security_groups.1.id={}", spec.security_group_id),
            format!("--server.user_data={}", STANDARD.encode(spec.user_data())),
            format!("--server.auto_terminate_time={}", spec.auto_terminate_at),
        ];
        for (position, (key, value)) in spec.tags.iter().enumerate() {
            let slot = position + 1;
            params.push(format!("--server.server_tags.{slot}.key={key}"));
            params.push(format!("--server.server_tags.{slot}.value={value}"));
        }
        if let Some(eip_id) = &spec.eip_id {
            params.push(format!("--server.publicip.id={eip_id}"));
            params.push(String::from("--server.publicip.delete_on_termination=true"));
        }
        args.extend(params.into_iter().map(OsString::from));
        args
    }

    async fn invoke<T>(&self, operation: &str, args: Vec<OsString>) -> Result<T, CloudError>
    where
        T: DeserializeOwned,
    {
        debug!(operation, "invoking hcloud");
        let output = self.execute(&args).await?;
        if !output.is_success() {
            return Err(self.failure(operation, output));
        }
        serde_json::from_str::<T>(&output.stdout).map_err(|err| {
            ErrorBody::extract(&output.stdout).map_or_else(
                || CloudError::Parse {
                    operation: operation.to_owned(),
                    message: err.to_string(),
                },
                |failure| api_error(operation, failure.status, failure.code, failure.message),
            )
        })
    }

    fn failure(&self, operation: &str, output: CommandOutput) -> CloudError {
        let body = ErrorBody::extract(&output.stdout).or_else(|| ErrorBody::extract(&output.stderr));
        match body {
            Some(failure) => api_error(operation, failure.status, failure.code, failure.message),
            None => CloudError::Exec(ExecError::failure(&self.config.hcloud_bin, output)),
        }
    }
}

fn api_error(operation: &str, status: Option<u16>, code: String, message: String) -> CloudError {
    CloudError::Api {
        operation: operation.to_owned(),
        status,
        code,
        message,
    }
}

impl<R: CommandRunner> CloudClient for HcloudClient<R> {
    fn create_eip<'a>(&'a self, name: &'a str, bandwidth_mbps: u32) -> CloudFuture<'a, EipHandle> {
        Box::pin(async move {
            let args = self.create_eip_args(name, bandwidth_mbps);
            let response: CreatePublicipResponse = self.invoke("CreatePublicip", args).await?;
            Ok(response.into_handle(name))
        })
    }

    fn delete_eip<'a>(&'a self, eip_id: &'a str) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            let mut args = self.base_args("EIP", "DeletePublicip");
            args.push(OsString::from(format!("--publicip_id={eip_id}")));
            let output = self.execute(&args).await?;
            if output.is_success() {
                return Ok(());
            }
            Err(self.failure("DeletePublicip", output))
        })
    }

    fn create_server<'a>(&'a self, spec: &'a ServerSpec) -> CloudFuture<'a, Option<String>> {
        Box::pin(async move {
            let args = self.create_server_args(spec);
            let response: CreateServersResponse =
                self.invoke("CreatePostPaidServers", args).await?;
            Ok(response.server_ids.into_iter().next())
        })
    }

    fn show_server<'a>(&'a self, server_id: &'a str) -> CloudFuture<'a, ServerDetail> {
        Box::pin(async move {
            let mut args = self.base_args("ECS", "ShowServer");
            args.push(OsString::from(format!("--server_id={server_id}")));
            let response: ShowServerResponse = self.invoke("ShowServer", args).await?;
            Ok(ServerDetail::from(response))
        })
    }

    fn delete_server<'a>(&'a self, server_id: &'a str) -> CloudFuture<'a, String> {
        Box::pin(async move {
            let mut args = self.base_args("ECS", "DeleteServers");
            args.extend(
                [
                    format!("--servers.1.id={server_id}"),
                    String::from("--delete_publicip=true"),
                    String::from("--delete_volume=true"),
                ]
                .map(OsString::from),
            );
            let response: DeleteServersResponse = self.invoke("DeleteServers", args).await?;
            Ok(response.job_id)
        })
    }

    fn show_job<'a>(&'a self, job_id: &'a str) -> CloudFuture<'a, JobStatus> {
        Box::pin(async move {
            let mut args = self.base_args("ECS", "ShowJob");
            args.push(OsString::from(format!("--job_id={job_id}")));
            let response: ShowJobResponse = self.invoke("ShowJob", args).await?;
            Ok(JobStatus::from(response))
        })
    }
}
