//! Background driver for the sync worker
//!
//! Runs [`SyncWorker::process_due_jobs`] on one tokio task: immediately on
//! start, then with a fixed delay between the end of one run and the start
//! of the next. Failures and panics inside a run are logged and the loop
//! keeps going.

use super::cancellation::CancellationToken;
use super::worker::SyncWorker;
use crate::error::{SyncError, SyncResult};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Periodic scheduler for due sync jobs
#[derive(Debug, Clone)]
pub struct SyncScheduler {
    worker: Arc<SyncWorker>,
    poll_interval: Duration,
}

impl SyncScheduler {
    /// Create a scheduler that waits `poll_interval` between runs
    #[must_use]
    pub const fn new(worker: Arc<SyncWorker>, poll_interval: Duration) -> Self {
        Self {
            worker,
            poll_interval,
        }
    }

    /// Delay between runs
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Spawn the scheduler loop on the current tokio runtime
    #[must_use = "dropping the handle leaves the scheduler running without a way to stop it"]
    pub fn start(self) -> SchedulerHandle {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        SchedulerHandle { shutdown, task }
    }

    async fn run(self, shutdown: CancellationToken) {
        info!(
            poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "Legacy sync scheduler started"
        );

        while !shutdown.is_cancelled() {
            self.tick().await;

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Legacy sync scheduler stopped");
    }

    /// Run the worker once, containing any error or panic
    ///
    /// Returns the number of jobs attempted, or `None` if the run failed.
    pub async fn tick(&self) -> Option<usize> {
        match AssertUnwindSafe(self.worker.process_due_jobs())
            .catch_unwind()
            .await
        {
            Ok(Ok(attempted)) => {
                if attempted > 0 {
                    debug!(attempted, "Legacy sync tick finished");
                }
                Some(attempted)
            }
            Ok(Err(err)) => {
                error!(error = %err, "Error processing legacy sync jobs");
                None
            }
            Err(_) => {
                error!("Legacy sync tick panicked");
                None
            }
        }
    }
}

/// Handle to a running [`SyncScheduler`]
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Check if the scheduler loop has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Token that stops the scheduler when cancelled
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop scheduling new runs and wait for the current one to finish
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Scheduler`] if the scheduler task itself failed.
    pub async fn shutdown(self) -> SyncResult<()> {
        self.shutdown.cancel();
        self.task
            .await
            .map_err(|err| SyncError::Scheduler(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncResult;
    use crate::sync::{
        JobFilter, JobStats, LockedSyncJob, MockLegacyGateway, RetryPolicy, SyncJob, SyncJobId,
        SyncJobStore,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Job store whose batch selection fails or panics on chosen calls
    #[derive(Default)]
    struct FlakyJobStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SyncJobStore for FlakyJobStore {
        async fn insert(&self, _job: &SyncJob) -> SyncResult<()> {
            Ok(())
        }

        async fn find(&self, _id: SyncJobId) -> SyncResult<Option<SyncJob>> {
            Ok(None)
        }

        async fn due_jobs(&self, _now: DateTime<Utc>, _limit: usize) -> SyncResult<Vec<SyncJob>> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(sqlx::Error::PoolTimedOut.into()),
                1 => panic!("selection exploded"),
                _ => Ok(Vec::new()),
            }
        }

        async fn lock(&self, _id: SyncJobId) -> SyncResult<Option<Box<dyn LockedSyncJob>>> {
            Ok(None)
        }

        async fn list(&self, _filter: &JobFilter) -> SyncResult<Vec<SyncJob>> {
            Ok(Vec::new())
        }

        async fn stats(&self) -> SyncResult<JobStats> {
            Ok(JobStats::default())
        }
    }

    fn scheduler(jobs: Arc<FlakyJobStore>, poll_interval: Duration) -> SyncScheduler {
        let worker = SyncWorker::new(
            jobs,
            Arc::new(MockLegacyGateway::new()),
            RetryPolicy::default(),
        );
        SyncScheduler::new(Arc::new(worker), poll_interval)
    }

    #[tokio::test]
    async fn test_tick_contains_errors_and_panics() {
        let jobs = Arc::new(FlakyJobStore::default());
        let scheduler = scheduler(Arc::clone(&jobs), Duration::from_millis(10));

        assert_eq!(scheduler.tick().await, None);
        assert_eq!(scheduler.tick().await, None);
        assert_eq!(scheduler.tick().await, Some(0));
    }

    #[tokio::test]
    async fn test_loop_survives_failures_and_stops_on_shutdown() {
        let jobs = Arc::new(FlakyJobStore::default());
        let handle = scheduler(Arc::clone(&jobs), Duration::from_millis(5)).start();

        tokio::time::timeout(Duration::from_secs(5), async {
            while jobs.calls.load(Ordering::SeqCst) < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(!handle.is_finished());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_is_immediate_then_fixed_delay() {
        let jobs = Arc::new(FlakyJobStore::default());
        let handle = scheduler(Arc::clone(&jobs), Duration::from_secs(60)).start();

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(jobs.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(jobs.calls.load(Ordering::SeqCst), 2);

        handle.shutdown().await.unwrap();
    }
}
