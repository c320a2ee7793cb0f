//! Structured logging for delivery attempts

use super::job::{SyncJob, SyncJobId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Identifiers and timing for one delivery attempt
#[derive(Debug, Clone, Serialize)]
pub struct AttemptContext {
    /// Job ID
    pub job_id: SyncJobId,
    /// Store the job refers to
    pub store_id: i64,
    /// Persisted change type
    pub change_type: String,
    /// Correlation id of the originating change
    pub correlation_id: String,
    /// Attempt number (1-based)
    pub attempt: u32,
    /// Attempt budget
    pub max_attempts: u32,
    /// When the attempt started
    pub started_at: DateTime<Utc>,
}

impl AttemptContext {
    /// Capture the context of the attempt `job` is about to make
    #[must_use]
    pub fn new(job: &SyncJob, max_attempts: u32) -> Self {
        Self {
            job_id: job.id,
            store_id: job.store_id,
            change_type: job.change_type.clone(),
            correlation_id: job.correlation_id.clone(),
            attempt: job.attempt_count,
            max_attempts,
            started_at: Utc::now(),
        }
    }

    /// Milliseconds since the attempt started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0)
            .try_into()
            .unwrap_or(0)
    }

    /// Log the start of an attempt
    pub fn log_start(&self) {
        debug!(
            job_id = %self.job_id,
            store_id = self.store_id,
            change_type = %self.change_type,
            correlation_id = %self.correlation_id,
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            "Legacy sync attempt started"
        );
    }

    /// Log a successful delivery
    pub fn log_success(&self) {
        info!(
            job_id = %self.job_id,
            store_id = self.store_id,
            change_type = %self.change_type,
            correlation_id = %self.correlation_id,
            attempt = self.attempt,
            duration_ms = self.elapsed_ms(),
            "Legacy sync succeeded"
        );
    }

    /// Log a transient failure that will be retried
    pub fn log_retry(&self, retry_after: Duration, error: &str) {
        warn!(
            job_id = %self.job_id,
            store_id = self.store_id,
            correlation_id = %self.correlation_id,
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            error = error,
            "Legacy sync failed, will retry"
        );
    }

    /// Log a failure that ends the job
    pub fn log_failure(&self, error: &str, exhausted: bool) {
        error!(
            job_id = %self.job_id,
            store_id = self.store_id,
            change_type = %self.change_type,
            correlation_id = %self.correlation_id,
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            exhausted = exhausted,
            error = error,
            "Legacy sync failed permanently"
        );
    }

    /// Log that the store changed since the job was scheduled
    pub fn log_version_mismatch(&self, expected: Option<i64>, actual: Option<i64>) {
        warn!(
            job_id = %self.job_id,
            store_id = self.store_id,
            correlation_id = %self.correlation_id,
            expected_version = ?expected,
            actual_version = ?actual,
            "Store version changed since the sync was scheduled, delivering latest state"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ChangeEvent, ChangeType};

    #[test]
    fn test_context_from_job() {
        let event = ChangeEvent::new(8, ChangeType::Updated, Some(2));
        let mut job = SyncJob::from_event(&event, Utc::now());
        job.attempt_count = 2;

        let ctx = AttemptContext::new(&job, 5);
        assert_eq!(ctx.job_id, job.id);
        assert_eq!(ctx.store_id, 8);
        assert_eq!(ctx.change_type, "UPDATED");
        assert_eq!(ctx.correlation_id, event.correlation_id);
        assert_eq!(ctx.attempt, 2);
        assert_eq!(ctx.max_attempts, 5);
        assert!(ctx.elapsed_ms() < 60_000);
    }
}
