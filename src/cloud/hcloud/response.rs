//! JSON shapes printed by the `hcloud` CLI.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::cloud::types::{
    AddressKind, EipHandle, InstanceStatus, JobState, JobStatus, ServerAddress, ServerDetail,
    SubJobFailure,
};

#[derive(Debug, Deserialize)]
pub(super) struct CreatePublicipResponse {
    publicip: PublicipBody,
}

#[derive(Debug, Deserialize)]
struct PublicipBody {
    id: String,
    #[serde(default)]
    public_ip_address: Option<String>,
}

impl CreatePublicipResponse {
    pub(super) fn into_handle(self, name: &str) -> EipHandle {
        EipHandle {
            id: self.publicip.id,
            ip_address: self.publicip.public_ip_address.unwrap_or_default(),
            name: name.to_owned(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateServersResponse {
    #[serde(rename = "serverIds", alias = "server_ids", default)]
    pub(super) server_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ShowServerResponse {
    server: ServerBody,
}

#[derive(Debug, Deserialize)]
struct ServerBody {
    id: String,
    status: String,
    #[serde(default)]
    addresses: BTreeMap<String, Vec<AddressBody>>,
}

#[derive(Debug, Deserialize)]
struct AddressBody {
    addr: String,
    #[serde(rename = "OS-EXT-IPS:type", default)]
    kind: Option<String>,
}

impl From<ShowServerResponse> for ServerDetail {
    fn from(value: ShowServerResponse) -> Self {
        let addresses = value
            .server
            .addresses
            .into_values()
            .flatten()
            .map(|entry| ServerAddress::new(entry.addr, AddressKind::from_tag(entry.kind.as_deref())))
            .collect();
        Self {
            id: value.server.id,
            status: InstanceStatus::from_provider(&value.server.status),
            addresses,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct DeleteServersResponse {
    pub(super) job_id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ShowJobResponse {
    status: String,
    #[serde(default)]
    fail_reason: Option<String>,
    #[serde(default)]
    entities: Option<JobEntities>,
}

#[derive(Debug, Default, Deserialize)]
struct JobEntities {
    #[serde(default)]
    sub_jobs: Vec<SubJobBody>,
}

#[derive(Debug, Deserialize)]
struct SubJobBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    fail_reason: Option<String>,
    #[serde(default)]
    entities: Option<SubJobEntities>,
}

#[derive(Debug, Default, Deserialize)]
struct SubJobEntities {
    #[serde(default)]
    server_id: Option<String>,
}

impl From<ShowJobResponse> for JobStatus {
    fn from(value: ShowJobResponse) -> Self {
        let failed_sub_jobs = value
            .entities
            .unwrap_or_default()
            .sub_jobs
            .into_iter()
            .filter(|job| JobState::from_provider(&job.status) == JobState::Failed)
            .map(|job| SubJobFailure {
                server_id: job.entities.unwrap_or_default().server_id,
                reason: job.fail_reason,
            })
            .collect();
        Self {
            state: JobState::from_provider(&value.status),
            fail_reason: value.fail_reason.filter(|reason| !reason.is_empty()),
            failed_sub_jobs,
        }
    }
}

/// Structured error body. The provider uses several layouts, so every field
/// is optional.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ErrorBody {
    #[serde(default, alias = "code")]
    error_code: Option<String>,
    #[serde(default, alias = "message")]
    error_msg: Option<String>,
    #[serde(default)]
    error: Option<NestedError>,
    #[serde(default)]
    status_code: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct NestedError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Provider error fields extracted from CLI output.
#[derive(Debug, Eq, PartialEq)]
pub(super) struct ApiFailure {
    pub(super) status: Option<u16>,
    pub(super) code: String,
    pub(super) message: String,
}

impl ErrorBody {
    /// Extracts the first JSON object embedded in `text` and reads it as an
    /// error body. Returns `None` when no error code or message is present.
    pub(super) fn extract(text: &str) -> Option<ApiFailure> {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        let json = text.get(start..=end)?;
        let body: Self = serde_json::from_str(json).ok()?;
        let nested = body.error.unwrap_or_default();
        let code = body.error_code.or(nested.code);
        let message = body.error_msg.or(nested.message);
        if code.is_none() && message.is_none() {
            return None;
        }
        Some(ApiFailure {
            status: body.status_code,
            code: code.unwrap_or_default(),
            message: message.unwrap_or_default(),
        })
    }
}
