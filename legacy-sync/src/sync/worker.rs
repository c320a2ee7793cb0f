//! Delivery worker: picks due jobs, calls the legacy gateway and records the
//! outcome
//!
//! Every attempt runs under the job's exclusive row lock and is persisted with
//! an optimistic token check, so two actors never attempt the same job at the
//! same time and a stale copy of a job never overwrites a newer one.

use super::gateway::LegacyGateway;
use super::job::SyncJob;
use super::observability::AttemptContext;
use super::outcome::AttemptOutcome;
use super::policy::RetryPolicy;
use super::repository::{LockedSyncJob, SyncJobStore};
use super::snapshot::StoreSnapshot;
use super::status::JobStatus;
use super::ChangeType;
use crate::error::SyncResult;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Processes sync jobs against the legacy system
#[derive(Clone)]
pub struct SyncWorker {
    jobs: Arc<dyn SyncJobStore>,
    gateway: Arc<dyn LegacyGateway>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for SyncWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWorker")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SyncWorker {
    /// Create a worker
    #[must_use]
    pub fn new(
        jobs: Arc<dyn SyncJobStore>,
        gateway: Arc<dyn LegacyGateway>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            jobs,
            gateway,
            policy,
        }
    }

    /// Retry policy in effect
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Job store the worker reads from and writes to
    #[must_use]
    pub const fn jobs(&self) -> &Arc<dyn SyncJobStore> {
        &self.jobs
    }

    /// Attempt every job that is due now, up to the batch size
    ///
    /// Jobs are taken oldest first; jobs locked by another actor are skipped.
    /// A failure on one job is logged and the batch continues. Returns the
    /// number of jobs actually attempted.
    ///
    /// # Errors
    ///
    /// Returns an error if the due jobs cannot be selected.
    pub async fn process_due_jobs(&self) -> SyncResult<usize> {
        let due = self
            .jobs
            .due_jobs(Utc::now(), self.policy.batch_limit())
            .await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!(count = due.len(), "Processing due legacy sync jobs");

        let mut attempted = 0;
        for job in &due {
            match self.process_job(job).await {
                Ok(Some(_)) => attempted += 1,
                Ok(None) => {}
                Err(err) => error!(
                    job_id = %job.id,
                    store_id = job.store_id,
                    error = %err,
                    "Failed to process legacy sync job"
                ),
            }
        }
        Ok(attempted)
    }

    /// Attempt one job under its exclusive lock
    ///
    /// `observed` is the caller's copy of the job. Nothing happens when the
    /// job no longer exists, is already terminal, or was advanced by another
    /// actor since `observed` was read. Returns the status after the attempt,
    /// or `None` if no attempt was made.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be locked or its outcome cannot be
    /// persisted for a reason other than a concurrency conflict.
    pub async fn process_job(&self, observed: &SyncJob) -> SyncResult<Option<JobStatus>> {
        let Some(mut locked) = self.jobs.lock(observed.id).await? else {
            warn!(job_id = %observed.id, "Legacy sync job no longer exists, skipping");
            return Ok(None);
        };

        let mut job = locked.job().clone();
        if job.status.is_terminal() {
            debug!(job_id = %job.id, status = %job.status, "Legacy sync job already finished");
            locked.release().await?;
            return Ok(None);
        }
        if job.concurrency_token != observed.concurrency_token {
            debug!(
                job_id = %job.id,
                observed_token = observed.concurrency_token,
                current_token = job.concurrency_token,
                "Legacy sync job advanced by another worker, skipping"
            );
            locked.release().await?;
            return Ok(None);
        }

        self.attempt(locked.as_mut(), &mut job).await;

        match locked.save(&job).await {
            Ok(saved) => Ok(Some(saved.status)),
            Err(err) if err.is_conflict() => {
                debug!(job_id = %job.id, "Concurrent update while saving legacy sync job, skipping");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Make one delivery attempt and apply its outcome to `job`
    ///
    /// Increments the attempt count, then moves the job to `SUCCEEDED`,
    /// `RETRY` (with a backoff-delayed due time) or `FAILED`. The store is
    /// re-read through `locked`; persisting the result is left to the caller.
    pub async fn attempt(
        &self,
        locked: &mut dyn LockedSyncJob,
        job: &mut SyncJob,
    ) -> AttemptOutcome {
        job.begin_attempt(Utc::now());
        let ctx = AttemptContext::new(job, self.policy.max_attempts);
        ctx.log_start();

        let outcome = self.deliver(locked, job, &ctx).await;
        let now = Utc::now();
        match &outcome {
            AttemptOutcome::Success => {
                job.mark_succeeded(now);
                ctx.log_success();
            }
            AttemptOutcome::NonRetryableFailure(reason) => {
                job.mark_failed(reason, now);
                ctx.log_failure(reason, false);
            }
            AttemptOutcome::TransientFailure(reason) => {
                if self.policy.is_exhausted(job.attempt_count) {
                    job.mark_failed(reason, now);
                    ctx.log_failure(reason, true);
                } else {
                    let delay = self.policy.backoff(job.attempt_count);
                    job.schedule_retry(reason, due_after(now, delay), now);
                    ctx.log_retry(delay, reason);
                }
            }
        }
        outcome
    }

    async fn deliver(
        &self,
        locked: &mut dyn LockedSyncJob,
        job: &SyncJob,
        ctx: &AttemptContext,
    ) -> AttemptOutcome {
        let store = match locked.find_store(job.store_id).await {
            Ok(Some(store)) => store,
            Ok(None) => {
                return AttemptOutcome::NonRetryableFailure(format!(
                    "Store not found: {}",
                    job.store_id
                ))
            }
            Err(err) => {
                return AttemptOutcome::TransientFailure(format!(
                    "Failed to reload store {}: {err}",
                    job.store_id
                ))
            }
        };

        let change = match job.parsed_change_type() {
            Ok(change) => change,
            Err(err) => return AttemptOutcome::NonRetryableFailure(err.to_string()),
        };

        let snapshot = match StoreSnapshot::from_store(&store) {
            Ok(snapshot) => snapshot,
            Err(err) => return AttemptOutcome::NonRetryableFailure(err.to_string()),
        };

        if job.expected_version.is_some() && job.expected_version != snapshot.version {
            ctx.log_version_mismatch(job.expected_version, snapshot.version);
        }

        let call = async {
            match change {
                ChangeType::Created => self.gateway.create_on_legacy_system(&snapshot).await,
                ChangeType::Updated => self.gateway.update_on_legacy_system(&snapshot).await,
            }
        };

        match tokio::time::timeout(self.policy.gateway_timeout, call).await {
            Ok(Ok(())) => AttemptOutcome::Success,
            Ok(Err(err)) => AttemptOutcome::TransientFailure(err.to_string()),
            Err(_) => AttemptOutcome::TransientFailure(format!(
                "Legacy gateway call timed out after {}ms",
                self.policy.gateway_timeout.as_millis()
            )),
        }
    }
}

fn due_after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    i64::try_from(delay.as_millis())
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
