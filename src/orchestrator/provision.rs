//! Elastic IP allocation and instance creation.

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::cloud::{CloudClient, EipHandle, InstanceStatus, ServerDetail, ServerSpec, select_addresses};
use crate::pool::fan_out;
use crate::request::ResourceRequest;

use super::report::{
    FailureReason, InstanceHandle, PartialAllocation, ProvisionFailure, ProvisionReport,
};
use super::{CREATE_CONCURRENCY, Orchestrator, poll_attempts};

const AUTO_TERMINATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

impl<C: CloudClient> Orchestrator<C> {
    /// Allocates `count` elastic IPs named `<name_prefix>_<i>` for `i` in
    /// `1..=count`.
    ///
    /// Each failure is logged individually. There is no implicit rollback:
    /// on partial success the allocated subset is handed back for the caller
    /// to release.
    ///
    /// # Errors
    ///
    /// Returns [`PartialAllocation`] unless every allocation succeeded.
    pub async fn allocate_eips(
        &self,
        count: usize,
        name_prefix: &str,
        bandwidth_mbps: u32,
    ) -> Result<Vec<EipHandle>, PartialAllocation> {
        let results = fan_out(1..=count, CREATE_CONCURRENCY, |position| async move {
            let name = format!("{name_prefix}_{position}");
            match self.cloud.create_eip(&name, bandwidth_mbps).await {
                Ok(handle) => {
                    info!(eip = %name, id = %handle.id, ip = %handle.ip_address, "allocated elastic IP");
                    Some((position, handle))
                }
                Err(err) => {
                    error!(eip = %name, error = %err, "failed to allocate elastic IP");
                    None
                }
            }
        })
        .await;

        let mut allocated: Vec<(usize, EipHandle)> = results.into_iter().flatten().collect();
        allocated.sort_by_key(|(position, _)| *position);
        let handles: Vec<EipHandle> = allocated.into_iter().map(|(_, handle)| handle).collect();
        info!("allocated {}/{count} elastic IPs", handles.len());

        if handles.len() == count {
            Ok(handles)
        } else {
            Err(PartialAllocation {
                requested: count,
                allocated: handles,
            })
        }
    }

    /// Creates `request.count` instances and waits for each to become active.
    ///
    /// When `eips` is supplied, the handle at position `i` is bound to
    /// instance `i`. Ready and failed entries together always account for
    /// every requested index.
    pub async fn create_instances(
        &self,
        request: &ResourceRequest,
        eips: Option<&[EipHandle]>,
    ) -> ProvisionReport {
        let terminate_at = (Utc::now() + ChronoDuration::hours(i64::from(request.timeout_hours)))
            .format(AUTO_TERMINATE_FORMAT)
            .to_string();
        let terminate_ref = terminate_at.as_str();

        let results = fan_out(0..request.count, CREATE_CONCURRENCY, |index| async move {
            let eip = eips.and_then(|list| list.get(index));
            self.create_one(request, index, eip, terminate_ref).await
        })
        .await;

        let mut report = ProvisionReport::default();
        for result in results {
            match result {
                Ok(handle) => report.ready.push(handle),
                Err(failure) => report.failures.push(failure),
            }
        }
        report.ready.sort_by_key(|handle| handle.index);
        report.failures.sort_by_key(|failure| failure.index);

        info!(
            "{}/{} instances ready",
            report.ready.len(),
            request.count
        );
        for failure in &report.failures {
            warn!(
                index = failure.index,
                server_id = failure.server_id.as_deref().unwrap_or("-"),
                reason = %failure.reason,
                "instance not ready"
            );
        }
        report
    }

    async fn create_one(
        &self,
        request: &ResourceRequest,
        index: usize,
        eip: Option<&EipHandle>,
        terminate_at: &str,
    ) -> Result<InstanceHandle, ProvisionFailure> {
        let spec = ServerSpec::for_index(
            request,
            index,
            eip.map(|handle| handle.id.clone()),
            terminate_at,
        );
        let fail = |server_id: Option<String>, reason: FailureReason| ProvisionFailure {
            index,
            name: spec.name.clone(),
            server_id,
            eip_id: spec.eip_id.clone(),
            reason,
        };

        let server_id = match self.cloud.create_server(&spec).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                error!(name = %spec.name, "create accepted without a server id");
                return Err(fail(None, FailureReason::MissingId));
            }
            Err(err) => {
                error!(name = %spec.name, error = %err, "create request rejected");
                return Err(fail(None, FailureReason::CreateRejected(err.to_string())));
            }
        };
        info!(name = %spec.name, server_id = %server_id, "instance requested");

        let detail = match self.wait_for_active(&server_id, &spec.name).await {
            Ok(detail) => detail,
            Err(reason) => return Err(fail(Some(server_id), reason)),
        };

        let (private_ip, floating_ip) = select_addresses(&detail.addresses);
        let Some(private) = private_ip else {
            error!(name = %spec.name, server_id = %server_id, "active instance has no private address");
            return Err(fail(Some(server_id), FailureReason::MissingAddress));
        };
        let public_ip = eip
            .map(|handle| handle.ip_address.clone())
            .filter(|address| !address.is_empty())
            .or(floating_ip);

        info!(
            name = %spec.name,
            private_ip = %private,
            public_ip = public_ip.as_deref().unwrap_or("N/A"),
            "instance active"
        );
        Ok(InstanceHandle {
            index,
            id: server_id,
            name: spec.name,
            private_ip: private,
            public_ip,
            status: InstanceStatus::Active,
            eip_id: eip.map(|handle| handle.id.clone()),
        })
    }

    async fn wait_for_active(
        &self,
        server_id: &str,
        name: &str,
    ) -> Result<ServerDetail, FailureReason> {
        for _ in 0..poll_attempts(self.ready_timeout, self.poll_interval) {
            match self.cloud.show_server(server_id).await {
                Ok(detail) if detail.status == InstanceStatus::Active => return Ok(detail),
                Ok(detail) if detail.status == InstanceStatus::Error => {
                    error!(instance = name, server_id, "instance entered ERROR state");
                    return Err(FailureReason::Errored);
                }
                Ok(_) => {}
                Err(err) if err.is_not_found() => {
                    info!(instance = name, server_id, "instance not visible yet");
                }
                Err(err) => {
                    warn!(instance = name, server_id, error = %err, "status check failed");
                }
            }
            sleep(self.poll_interval).await;
        }
        error!(instance = name, server_id, "timed out waiting for ACTIVE");
        Err(FailureReason::TimedOut)
    }
}
