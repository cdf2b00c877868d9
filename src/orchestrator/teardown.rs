//! Instance deletion, elastic IP release, and batch cleanup.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::cloud::{CloudClient, CloudError, EipHandle, JobState};
use crate::pool::fan_out;

use super::report::{DeletionReport, ProvisionReport, TeardownReport};
use super::{DELETE_CONCURRENCY, Orchestrator, poll_attempts};

#[derive(Debug, Error)]
enum DeleteFailure {
    #[error(transparent)]
    Cloud(#[from] CloudError),
    #[error("job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },
    #[error("job {job_id} did not finish in time")]
    JobTimeout { job_id: String },
}

impl<C: CloudClient> Orchestrator<C> {
    /// Deletes servers together with their volumes and bound public IPs.
    ///
    /// Each server gets the full deletion sequence (request, then job
    /// polling) retried under the deletion retry policy.
    pub async fn delete_instances(&self, ids: &[String]) -> DeletionReport {
        if ids.is_empty() {
            warn!("no instances to delete");
            return DeletionReport::default();
        }
        let results = fan_out(ids, DELETE_CONCURRENCY, |id| async move {
            let outcome = self
                .delete_retry
                .run(id, |_| self.delete_instance_once(id))
                .await;
            (id.clone(), outcome)
        })
        .await;
        summarise("instances", results)
    }

    /// Releases elastic IPs. An IP the provider no longer knows counts as
    /// released.
    pub async fn delete_eips(&self, ids: &[String]) -> DeletionReport {
        if ids.is_empty() {
            warn!("no elastic IPs to release");
            return DeletionReport::default();
        }
        let results = fan_out(ids, DELETE_CONCURRENCY, |id| async move {
            let outcome = self
                .delete_retry
                .run(id, |_| async move {
                    match self.cloud.delete_eip(id).await {
                        Ok(()) => Ok(()),
                        Err(err) if err.is_not_found() => {
                            info!(eip_id = %id, "elastic IP already released");
                            Ok(())
                        }
                        Err(err) => Err(err),
                    }
                })
                .await;
            (id.clone(), outcome)
        })
        .await;
        summarise("elastic IPs", results)
    }

    /// Tears down everything a provisioning batch left behind: every server
    /// the provider assigned an id to, then every elastic IP that was not
    /// released together with its server.
    pub async fn cleanup(&self, report: &ProvisionReport, eips: &[EipHandle]) -> TeardownReport {
        let server_ids = report.created_ids();
        let instances = if server_ids.is_empty() {
            DeletionReport::default()
        } else {
            self.delete_instances(&server_ids).await
        };

        let released = released_with_servers(report, &instances);
        let remaining: Vec<String> = eips
            .iter()
            .map(|eip| eip.id.clone())
            .filter(|id| !released.contains(id))
            .collect();
        let eip_report = if remaining.is_empty() {
            DeletionReport::default()
        } else {
            self.delete_eips(&remaining).await
        };

        let teardown = TeardownReport {
            instances,
            eips: eip_report,
        };
        if !teardown.is_clean() {
            error!(leftovers = ?teardown.leftovers(), "teardown left resources behind");
        }
        teardown
    }

    async fn delete_instance_once(&self, server_id: &str) -> Result<(), DeleteFailure> {
        let job_id = self.cloud.delete_server(server_id).await?;
        info!(server_id, job_id = %job_id, "deletion job submitted");
        self.wait_for_job(server_id, &job_id).await
    }

    async fn wait_for_job(&self, server_id: &str, job_id: &str) -> Result<(), DeleteFailure> {
        for _ in 0..poll_attempts(self.job_timeout, self.job_poll_interval) {
            match self.cloud.show_job(job_id).await {
                Ok(status) => {
                    for sub_job in &status.failed_sub_jobs {
                        warn!(
                            server_id = sub_job.server_id.as_deref().unwrap_or(server_id),
                            reason = sub_job.reason.as_deref().unwrap_or("unknown"),
                            "deletion sub-job failed"
                        );
                    }
                    match status.state {
                        JobState::Success => return Ok(()),
                        JobState::Failed => {
                            return Err(DeleteFailure::JobFailed {
                                job_id: job_id.to_owned(),
                                reason: status
                                    .fail_reason
                                    .unwrap_or_else(|| String::from("unknown")),
                            });
                        }
                        JobState::Pending(_) => {}
                    }
                }
                Err(err) => warn!(server_id, job_id, error = %err, "job status check failed"),
            }
            sleep(self.job_poll_interval).await;
        }
        Err(DeleteFailure::JobTimeout {
            job_id: job_id.to_owned(),
        })
    }
}

/// Elastic IPs bound to servers whose deletion (with `delete_publicip`)
/// succeeded.
fn released_with_servers(report: &ProvisionReport, instances: &DeletionReport) -> BTreeSet<String> {
    let eip_by_server: BTreeMap<&str, &str> = report
        .ready
        .iter()
        .filter_map(|handle| Some((handle.id.as_str(), handle.eip_id.as_deref()?)))
        .chain(report.failures.iter().filter_map(|failure| {
            Some((failure.server_id.as_deref()?, failure.eip_id.as_deref()?))
        }))
        .collect();
    instances
        .deleted
        .iter()
        .filter_map(|server_id| eip_by_server.get(server_id.as_str()))
        .map(|eip_id| (*eip_id).to_owned())
        .collect()
}

fn summarise<E: Display>(kind: &str, results: Vec<(String, Result<(), E>)>) -> DeletionReport {
    let attempted = results.len();
    let mut report = DeletionReport::default();
    for (id, outcome) in results {
        match outcome {
            Ok(()) => report.deleted.push(id),
            Err(err) => {
                error!(id = %id, error = %err, "deletion failed after retries");
                report.failed.push(id);
            }
        }
    }
    report.deleted.sort();
    report.failed.sort();
    info!("{}/{attempted} {kind} deleted", report.deleted.len());
    if !report.failed.is_empty() {
        warn!(failed = ?report.failed, "{kind} still present");
    }
    report
}
