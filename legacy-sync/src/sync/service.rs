//! Entry point for the write path
//!
//! The service turns a store write into a durable sync job staged in the
//! same unit of work, and registers one inline delivery attempt to run once
//! that unit of work has committed. Retries are left to the scheduler.

use super::event::{ChangeEvent, ChangeType};
use super::job::SyncJob;
use super::outbox::UnitOfWork;
use super::snapshot::StoreSnapshot;
use super::worker::SyncWorker;
use crate::error::SyncResult;
use crate::store::Store;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Schedules legacy synchronization for store changes
#[derive(Debug, Clone)]
pub struct SyncService {
    worker: Arc<SyncWorker>,
}

impl SyncService {
    /// Create a service whose inline attempts run on `worker`
    #[must_use]
    pub const fn new(worker: Arc<SyncWorker>) -> Self {
        Self { worker }
    }

    /// Worker used for inline attempts
    #[must_use]
    pub const fn worker(&self) -> &Arc<SyncWorker> {
        &self.worker
    }

    /// Schedule synchronization of a newly created store
    ///
    /// Returns the recorded event, or `None` if the store has no identity yet.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidSnapshot`](crate::error::SyncError::InvalidSnapshot)
    /// for a store without a name, or the unit of work's error if the job
    /// cannot be staged. Either way the caller should roll back.
    pub async fn schedule_create_sync(
        &self,
        uow: &mut dyn UnitOfWork,
        store: &Store,
    ) -> SyncResult<Option<ChangeEvent>> {
        self.schedule(uow, store, ChangeType::Created).await
    }

    /// Schedule synchronization of an updated store
    ///
    /// Returns the recorded event, or `None` if the store has no identity yet.
    ///
    /// # Errors
    ///
    /// Same as [`schedule_create_sync`](Self::schedule_create_sync).
    pub async fn schedule_update_sync(
        &self,
        uow: &mut dyn UnitOfWork,
        store: &Store,
    ) -> SyncResult<Option<ChangeEvent>> {
        self.schedule(uow, store, ChangeType::Updated).await
    }

    async fn schedule(
        &self,
        uow: &mut dyn UnitOfWork,
        store: &Store,
        change_type: ChangeType,
    ) -> SyncResult<Option<ChangeEvent>> {
        if store.id.is_none() {
            debug!(name = %store.name, "Store has no identity yet, nothing to sync");
            return Ok(None);
        }

        let snapshot = StoreSnapshot::from_store(store)?;
        let event = ChangeEvent::new(snapshot.id, change_type, snapshot.version);
        let job = SyncJob::from_event(&event, Utc::now());
        uow.stage_job(&job).await?;

        let worker = Arc::clone(&self.worker);
        uow.after_commit(Box::pin(async move {
            if let Err(err) = worker.process_job(&job).await {
                warn!(
                    job_id = %job.id,
                    store_id = job.store_id,
                    correlation_id = %job.correlation_id,
                    error = %err,
                    "Inline legacy sync attempt failed, leaving the job to the scheduler"
                );
            }
        }));

        debug!(
            store_id = event.store_id,
            change_type = %event.change_type,
            correlation_id = %event.correlation_id,
            "Legacy sync scheduled"
        );
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use crate::sync::gateway::MockLegacyGateway;
    use crate::sync::{Database, JobStatus, RetryPolicy, SyncJobStore};

    fn service(db: &MemoryDatabase, gateway: MockLegacyGateway) -> SyncService {
        let worker = SyncWorker::new(db.jobs(), Arc::new(gateway), RetryPolicy::default());
        SyncService::new(Arc::new(worker))
    }

    #[tokio::test]
    async fn test_store_without_identity_is_ignored() {
        let db = MemoryDatabase::new();
        let service = service(&db, MockLegacyGateway::new());

        let mut uow = db.begin().await.unwrap();
        let event = service
            .schedule_create_sync(uow.as_mut(), &Store::new("Zwolle", 1))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        assert!(event.is_none());
        assert!(db.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_commit_persists_job_and_attempts_inline() {
        let db = MemoryDatabase::new();
        let mut gateway = MockLegacyGateway::new();
        gateway
            .expect_update_on_legacy_system()
            .times(1)
            .returning(|_| Ok(()));
        let service = service(&db, gateway);
        let store = db.stores().save(Store::new("Assen", 3));

        let mut uow = db.begin().await.unwrap();
        let event = service
            .schedule_update_sync(uow.as_mut(), &store)
            .await
            .unwrap()
            .unwrap();
        assert!(db.jobs().is_empty());

        uow.commit().await.unwrap();

        let jobs = db.jobs().snapshot();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].correlation_id, event.correlation_id);
        assert_eq!(jobs[0].change_type, "UPDATED");
        assert_eq!(jobs[0].status, JobStatus::Succeeded);
        assert_eq!(jobs[0].attempt_count, 1);
    }

    #[tokio::test]
    async fn test_rollback_leaves_no_job_and_no_call() {
        let db = MemoryDatabase::new();
        let service = service(&db, MockLegacyGateway::new());
        let store = db.stores().save(Store::new("Emmen", 3));

        let mut uow = db.begin().await.unwrap();
        service
            .schedule_create_sync(uow.as_mut(), &store)
            .await
            .unwrap();
        uow.rollback().await.unwrap();

        assert!(db.jobs().is_empty());
        assert!(db.jobs().stats().await.unwrap().total() == 0);
    }
}
