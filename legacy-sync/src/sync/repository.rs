//! Storage seam for sync jobs

use super::job::{SyncJob, SyncJobId};
use super::status::JobStatus;
use crate::error::SyncResult;
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default row limit for [`JobFilter`]
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Filter for listing jobs, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFilter {
    /// Only jobs in this status
    pub status: Option<JobStatus>,
    /// Only jobs for this store
    pub store_id: Option<i64>,
    /// Maximum number of rows
    pub limit: usize,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            store_id: None,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl JobFilter {
    /// Restrict to a status
    #[must_use]
    pub const fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict to a store
    #[must_use]
    pub const fn with_store(mut self, store_id: i64) -> Self {
        self.store_id = Some(store_id);
        self
    }

    /// Change the row limit
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Check whether a job passes the filter (limit aside)
    #[must_use]
    pub fn matches(&self, job: &SyncJob) -> bool {
        self.status.is_none_or(|status| job.status == status)
            && self.store_id.is_none_or(|store_id| job.store_id == store_id)
    }
}

/// Job counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    /// Jobs never attempted
    pub pending: u64,
    /// Jobs waiting for another attempt
    pub retry: u64,
    /// Delivered jobs
    pub succeeded: u64,
    /// Jobs given up on
    pub failed: u64,
}

impl JobStats {
    /// Add `count` jobs in `status`
    pub fn record(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Retry => self.retry += count,
            JobStatus::Succeeded => self.succeeded += count,
            JobStatus::Failed => self.failed += count,
        }
    }

    /// Count for one status
    #[must_use]
    pub const fn get(&self, status: JobStatus) -> u64 {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Retry => self.retry,
            JobStatus::Succeeded => self.succeeded,
            JobStatus::Failed => self.failed,
        }
    }

    /// Total number of jobs
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.pending + self.retry + self.succeeded + self.failed
    }

    /// Jobs not yet in a terminal state
    #[must_use]
    pub const fn outstanding(&self) -> u64 {
        self.pending + self.retry
    }
}

/// Durable store of sync jobs
///
/// Implementations must provide two kinds of row locks: a blocking exclusive
/// lock for [`lock`](Self::lock) and a lock-and-skip selection for
/// [`due_jobs`](Self::due_jobs), so that concurrent workers never wait on each
/// other while batching and never attempt the same job at once.
#[async_trait]
pub trait SyncJobStore: Send + Sync {
    /// Persist a new job
    async fn insert(&self, job: &SyncJob) -> SyncResult<()>;

    /// Read the committed state of a job without locking it
    async fn find(&self, id: SyncJobId) -> SyncResult<Option<SyncJob>>;

    /// Up to `limit` claimable jobs due at `now`, oldest first, skipping
    /// rows another actor currently holds
    async fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> SyncResult<Vec<SyncJob>>;

    /// Lock a job exclusively, waiting for other holders
    ///
    /// Returns `None` if the job does not exist.
    async fn lock(&self, id: SyncJobId) -> SyncResult<Option<Box<dyn LockedSyncJob>>>;

    /// List jobs, newest first
    async fn list(&self, filter: &JobFilter) -> SyncResult<Vec<SyncJob>>;

    /// Count jobs per status
    async fn stats(&self) -> SyncResult<JobStats>;
}

/// A job held under an exclusive lock
///
/// Dropping the guard releases the lock without writing.
#[async_trait]
pub trait LockedSyncJob: Send {
    /// State of the job as read under the lock
    fn job(&self) -> &SyncJob;

    /// Read a committed store through the connection that holds the lock
    ///
    /// A worker calls this while the lock is held, so pooled backends must not
    /// check out a second connection here: a full pool of lock holders would
    /// otherwise wait on each other until the pool times out.
    async fn find_store(&mut self, store_id: i64) -> SyncResult<Option<Store>>;

    /// Write `job` back, bump its concurrency token and release the lock
    ///
    /// Returns the persisted job. Fails with
    /// [`SyncError::ConcurrencyConflict`](crate::error::SyncError::ConcurrencyConflict)
    /// if the stored token no longer matches the one read under the lock.
    async fn save(self: Box<Self>, job: &SyncJob) -> SyncResult<SyncJob>;

    /// Release the lock without writing
    async fn release(self: Box<Self>) -> SyncResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ChangeEvent, ChangeType};

    #[test]
    fn test_filter_matches() {
        let event = ChangeEvent::new(5, ChangeType::Created, None);
        let job = SyncJob::from_event(&event, Utc::now());

        assert!(JobFilter::default().matches(&job));
        assert!(JobFilter::default().with_status(JobStatus::Pending).matches(&job));
        assert!(!JobFilter::default().with_status(JobStatus::Failed).matches(&job));
        assert!(JobFilter::default().with_store(5).matches(&job));
        assert!(!JobFilter::default().with_store(6).matches(&job));
    }

    #[test]
    fn test_stats_record() {
        let mut stats = JobStats::default();
        stats.record(JobStatus::Pending, 2);
        stats.record(JobStatus::Retry, 1);
        stats.record(JobStatus::Failed, 3);

        assert_eq!(stats.get(JobStatus::Pending), 2);
        assert_eq!(stats.total(), 6);
        assert_eq!(stats.outstanding(), 3);
    }
}
