//! In-memory [`CloudClient`] with per-resource scripted behaviour.
//!
//! Behaviour is keyed by resource name or id rather than call order, so the
//! orchestrator's concurrent fan-out stays deterministic under test.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use crate::cloud::{
    AddressKind, CloudClient, CloudError, CloudFuture, EipHandle, InstanceStatus, JobState,
    JobStatus, ServerAddress, ServerDetail, ServerSpec, SubJobFailure,
};

use super::lock;

/// Scripted outcome of creating the server with a given hostname.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerPlan {
    /// Created and immediately active.
    Active,
    /// Reported as not found for the given number of polls, then active.
    ActiveAfterPolls(usize),
    /// Created, then reported in `ERROR`.
    Error,
    /// Created but never leaves `BUILDING`.
    NeverReady,
    /// Creation request rejected by the provider.
    Reject,
    /// Creation accepted without returning an id.
    NoId,
}

/// Scripted outcome of deleting a server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeletePlan {
    /// Every deletion job succeeds.
    Succeed,
    /// The first `n` deletion jobs report `FAIL`, later ones succeed.
    FailJobs(u32),
    /// The first `n` delete requests are rejected, later ones succeed.
    RejectRequests(u32),
    /// Every deletion job stays running forever.
    Hang,
}

/// Scripted outcome of releasing an elastic IP.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EipDeletePlan {
    /// Release succeeds.
    Succeed,
    /// Provider reports the IP as already gone.
    NotFound,
    /// Every release attempt fails.
    Fail,
}

#[derive(Debug, Default)]
struct FakeCloudState {
    failing_eips: BTreeSet<String>,
    server_plans: BTreeMap<String, ServerPlan>,
    delete_plans: BTreeMap<String, DeletePlan>,
    eip_delete_plans: BTreeMap<String, EipDeletePlan>,
    eips: BTreeMap<String, String>,
    servers: BTreeMap<String, (ServerSpec, ServerPlan)>,
    created_specs: Vec<ServerSpec>,
    show_calls: BTreeMap<String, usize>,
    delete_attempts: BTreeMap<String, u32>,
    jobs: BTreeMap<String, JobState>,
    deleted_servers: Vec<String>,
    eip_delete_attempts: BTreeMap<String, u32>,
    released_eips: Vec<String>,
}

/// Fake cloud shared by clones; assertions read the recorded calls.
#[derive(Clone, Debug, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<FakeCloudState>>,
}

fn not_found(operation: &str, id: &str) -> CloudError {
    CloudError::Api {
        operation: operation.to_owned(),
        status: Some(404),
        code: String::from("Ecs.0114"),
        message: format!("resource {id} not found"),
    }
}

fn rejected(operation: &str) -> CloudError {
    CloudError::Api {
        operation: operation.to_owned(),
        status: Some(400),
        code: String::from("Common.0001"),
        message: String::from("simulated rejection"),
    }
}

fn index_tag(spec: &ServerSpec) -> usize {
    spec.tags
        .iter()
        .find(|(key, _)| key == "Index")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or_default()
}

impl FakeCloud {
    /// Creates a cloud where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes allocation of the elastic IP named `name` fail.
    #[must_use]
    pub fn with_failing_eip(self, name: &str) -> Self {
        lock(&self.state).failing_eips.insert(name.to_owned());
        self
    }

    /// Scripts the server whose hostname is `hostname`.
    #[must_use]
    pub fn with_server_plan(self, hostname: &str, plan: ServerPlan) -> Self {
        lock(&self.state)
            .server_plans
            .insert(hostname.to_owned(), plan);
        self
    }

    /// Scripts deletion of `server_id`.
    #[must_use]
    pub fn with_delete_plan(self, server_id: &str, plan: DeletePlan) -> Self {
        lock(&self.state)
            .delete_plans
            .insert(server_id.to_owned(), plan);
        self
    }

    /// Scripts release of `eip_id`.
    #[must_use]
    pub fn with_eip_delete_plan(self, eip_id: &str, plan: EipDeletePlan) -> Self {
        lock(&self.state)
            .eip_delete_plans
            .insert(eip_id.to_owned(), plan);
        self
    }

    /// Id the fake assigns to the server with `hostname`.
    #[must_use]
    pub fn server_id_for(hostname: &str) -> String {
        format!("srv-{hostname}")
    }

    /// Id the fake assigns to the elastic IP named `name`.
    #[must_use]
    pub fn eip_id_for(name: &str) -> String {
        format!("eip-{name}")
    }

    /// Every server creation request received, in arrival order.
    #[must_use]
    pub fn created_specs(&self) -> Vec<ServerSpec> {
        lock(&self.state).created_specs.clone()
    }

    /// Servers whose deletion job succeeded.
    #[must_use]
    pub fn deleted_servers(&self) -> Vec<String> {
        let mut deleted = lock(&self.state).deleted_servers.clone();
        deleted.sort();
        deleted
    }

    /// Number of delete requests issued for `server_id`.
    #[must_use]
    pub fn delete_attempts(&self, server_id: &str) -> u32 {
        lock(&self.state)
            .delete_attempts
            .get(server_id)
            .copied()
            .unwrap_or_default()
    }

    /// Number of release requests issued for `eip_id`.
    #[must_use]
    pub fn eip_delete_attempts(&self, eip_id: &str) -> u32 {
        lock(&self.state)
            .eip_delete_attempts
            .get(eip_id)
            .copied()
            .unwrap_or_default()
    }

    /// Elastic IPs released successfully.
    #[must_use]
    pub fn released_eips(&self) -> Vec<String> {
        let mut released = lock(&self.state).released_eips.clone();
        released.sort();
        released
    }

    /// Number of status polls issued for `server_id`.
    #[must_use]
    pub fn show_calls(&self, server_id: &str) -> usize {
        lock(&self.state)
            .show_calls
            .get(server_id)
            .copied()
            .unwrap_or_default()
    }

    fn detail(state: &FakeCloudState, id: &str, spec: &ServerSpec, status: InstanceStatus) -> ServerDetail {
        let mut addresses = vec![ServerAddress::new(
            format!("10.0.0.{}", index_tag(spec) + 1),
            AddressKind::Fixed,
        )];
        if let Some(ip) = spec
            .eip_id
            .as_ref()
            .and_then(|eip_id| state.eips.get(eip_id))
        {
            addresses.push(ServerAddress::new(ip.clone(), AddressKind::Floating));
        }
        ServerDetail {
            id: id.to_owned(),
            status,
            addresses,
        }
    }
}

impl CloudClient for FakeCloud {
    fn create_eip<'a>(&'a self, name: &'a str, _bandwidth_mbps: u32) -> CloudFuture<'a, EipHandle> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            if state.failing_eips.contains(name) {
                return Err(rejected("CreatePublicip"));
            }
            let suffix = name
                .rsplit('_')
                .next()
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or_default();
            let handle = EipHandle {
                id: Self::eip_id_for(name),
                ip_address: format!("203.0.113.{suffix}"),
                name: name.to_owned(),
            };
            state
                .eips
                .insert(handle.id.clone(), handle.ip_address.clone());
            Ok(handle)
        })
    }

    fn delete_eip<'a>(&'a self, eip_id: &'a str) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            *state
                .eip_delete_attempts
                .entry(eip_id.to_owned())
                .or_default() += 1;
            let plan = state
                .eip_delete_plans
                .get(eip_id)
                .copied()
                .unwrap_or(EipDeletePlan::Succeed);
            match plan {
                EipDeletePlan::Succeed => {
                    state.released_eips.push(eip_id.to_owned());
                    Ok(())
                }
                EipDeletePlan::NotFound => Err(CloudError::Api {
                    operation: String::from("DeletePublicip"),
                    status: Some(404),
                    code: String::from("VPC.0504"),
                    message: String::from("publicip not found"),
                }),
                EipDeletePlan::Fail => Err(rejected("DeletePublicip")),
            }
        })
    }

    fn create_server<'a>(&'a self, spec: &'a ServerSpec) -> CloudFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.created_specs.push(spec.clone());
            let plan = state
                .server_plans
                .get(&spec.hostname)
                .copied()
                .unwrap_or(ServerPlan::Active);
            match plan {
                ServerPlan::Reject => Err(rejected("CreatePostPaidServers")),
                ServerPlan::NoId => Ok(None),
                _ => {
                    let id = Self::server_id_for(&spec.hostname);
                    state.servers.insert(id.clone(), (spec.clone(), plan));
                    Ok(Some(id))
                }
            }
        })
    }

    fn show_server<'a>(&'a self, server_id: &'a str) -> CloudFuture<'a, ServerDetail> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            let calls = {
                let entry = state.show_calls.entry(server_id.to_owned()).or_default();
                *entry += 1;
                *entry
            };
            let Some((spec, plan)) = state.servers.get(server_id).cloned() else {
                return Err(not_found("ShowServer", server_id));
            };
            let status = match plan {
                ServerPlan::ActiveAfterPolls(hidden) if calls <= hidden => {
                    return Err(not_found("ShowServer", server_id));
                }
                ServerPlan::Error => InstanceStatus::Error,
                ServerPlan::NeverReady => InstanceStatus::Building,
                _ => InstanceStatus::Active,
            };
            Ok(Self::detail(&state, server_id, &spec, status))
        })
    }

    fn delete_server<'a>(&'a self, server_id: &'a str) -> CloudFuture<'a, String> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            let attempt = {
                let entry = state
                    .delete_attempts
                    .entry(server_id.to_owned())
                    .or_default();
                *entry += 1;
                *entry
            };
            let plan = state
                .delete_plans
                .get(server_id)
                .copied()
                .unwrap_or(DeletePlan::Succeed);
            let job_state = match plan {
                DeletePlan::RejectRequests(limit) if attempt <= limit => {
                    return Err(rejected("DeleteServers"));
                }
                DeletePlan::FailJobs(limit) if attempt <= limit => JobState::Failed,
                DeletePlan::Hang => JobState::Pending(String::from("RUNNING")),
                _ => {
                    state.deleted_servers.push(server_id.to_owned());
                    JobState::Success
                }
            };
            let job_id = format!("job-{attempt}-{server_id}");
            state.jobs.insert(job_id.clone(), job_state);
            Ok(job_id)
        })
    }

    fn show_job<'a>(&'a self, job_id: &'a str) -> CloudFuture<'a, JobStatus> {
        Box::pin(async move {
            let state = lock(&self.state);
            let Some(job_state) = state.jobs.get(job_id).cloned() else {
                return Err(not_found("ShowJob", job_id));
            };
            let failed_sub_jobs = if job_state == JobState::Failed {
                vec![SubJobFailure {
                    server_id: None,
                    reason: Some(String::from("simulated sub-job failure")),
                }]
            } else {
                Vec::new()
            };
            Ok(JobStatus {
                fail_reason: (job_state == JobState::Failed)
                    .then(|| String::from("simulated job failure")),
                state: job_state,
                failed_sub_jobs,
            })
        })
    }
}
