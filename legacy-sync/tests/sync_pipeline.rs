//! Integration tests for the synchronization pipeline
//!
//! Drives the full write path, worker and scheduler over the in-memory backend.

use chrono::TimeDelta;
use legacy_sync::config::SyncConfig;
use legacy_sync::error::SyncError;
use legacy_sync::memory::MemoryDatabase;
use legacy_sync::prelude::*;
use legacy_sync::store::Store;
use legacy_sync::testing::ScriptedGateway;
use std::sync::Arc;
use std::time::Duration;

/// Helper to wire a pipeline over a fresh in-memory database
fn pipeline(gateway: &Arc<ScriptedGateway>, config: &SyncConfig) -> (MemoryDatabase, SyncPipeline) {
    let database = MemoryDatabase::new();
    let pipeline = SyncPipeline::in_memory(&database, gateway.clone(), config);
    (database, pipeline)
}

fn only_job(database: &MemoryDatabase) -> SyncJob {
    let jobs = database.jobs().snapshot();
    assert_eq!(jobs.len(), 1, "expected exactly one job, got {jobs:?}");
    jobs.into_iter().next().unwrap()
}

async fn current(database: &MemoryDatabase, job: &SyncJob) -> SyncJob {
    database.jobs().find(job.id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_create_synchronizes_inline() {
    let gateway = Arc::new(ScriptedGateway::new());
    let (database, pipeline) = pipeline(&gateway, &SyncConfig::default());

    let store = pipeline
        .store_service()
        .create(NewStore::new("Amsterdam", 10))
        .await
        .unwrap();

    let job = only_job(&database);
    assert_eq!(job.store_id, store.id.unwrap());
    assert_eq!(job.change_type, "CREATED");
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.attempt_count, 1);
    assert!(job.last_error.is_none());

    assert_eq!(gateway.create_calls(), 1);
    assert_eq!(gateway.update_calls(), 0);
    let snapshot = gateway.last_snapshot().unwrap();
    assert_eq!(snapshot.name, "Amsterdam");
    assert_eq!(snapshot.quantity_products_in_stock, 10);
}

#[tokio::test]
async fn test_transient_failures_back_off_exponentially() {
    let gateway = Arc::new(ScriptedGateway::failing_first(3));
    let (database, pipeline) = pipeline(&gateway, &SyncConfig::default());

    pipeline
        .store_service()
        .create(NewStore::new("Utrecht", 3))
        .await
        .unwrap();

    let mut job = only_job(&database);
    assert_eq!(job.status, JobStatus::Retry);
    assert_eq!(job.attempt_count, 1);
    assert_eq!(job.next_attempt_at - job.updated_at, TimeDelta::milliseconds(200));
    assert!(job.last_error.as_deref().unwrap().contains("scripted failure"));

    for (attempt, delay_ms) in [(2, 400), (3, 800)] {
        let status = pipeline.worker().process_job(&job).await.unwrap();
        assert_eq!(status, Some(JobStatus::Retry));

        job = current(&database, &job).await;
        assert_eq!(job.attempt_count, attempt);
        assert_eq!(
            job.next_attempt_at - job.updated_at,
            TimeDelta::milliseconds(delay_ms)
        );
    }

    let status = pipeline.worker().process_job(&job).await.unwrap();
    assert_eq!(status, Some(JobStatus::Succeeded));
    let job = current(&database, &job).await;
    assert_eq!(job.attempt_count, 4);
    assert!(job.last_error.is_none());
    assert_eq!(gateway.calls(), 4);
}

#[tokio::test]
async fn test_success_on_last_attempt_is_not_failed() {
    let gateway = Arc::new(ScriptedGateway::failing_first(4));
    let (database, pipeline) = pipeline(&gateway, &SyncConfig::default());

    pipeline
        .store_service()
        .create(NewStore::new("Zwolle", 2))
        .await
        .unwrap();

    let mut job = only_job(&database);
    let mut delays = vec![job.next_attempt_at - job.updated_at];
    for _ in 0..3 {
        pipeline.worker().process_job(&job).await.unwrap();
        job = current(&database, &job).await;
        delays.push(job.next_attempt_at - job.updated_at);
    }
    assert_eq!(job.status, JobStatus::Retry);
    assert_eq!(
        delays,
        [200, 400, 800, 1_600].map(TimeDelta::milliseconds).to_vec()
    );

    let status = pipeline.worker().process_job(&job).await.unwrap();
    assert_eq!(status, Some(JobStatus::Succeeded));
    let job = current(&database, &job).await;
    assert_eq!(job.attempt_count, 5);
    assert!(job.last_error.is_none());
    assert_eq!(gateway.calls(), 5);
}

#[tokio::test]
async fn test_exhausted_job_fails_and_stays_failed() {
    let gateway = Arc::new(ScriptedGateway::always_failing());
    let (database, pipeline) = pipeline(&gateway, &SyncConfig::default());

    pipeline
        .store_service()
        .create(NewStore::new("Breda", 1))
        .await
        .unwrap();

    let mut job = only_job(&database);
    for _ in 0..4 {
        pipeline.worker().process_job(&job).await.unwrap();
        job = current(&database, &job).await;
    }

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempt_count, 5);
    assert!(job.last_error.is_some());
    assert_eq!(gateway.calls(), 5);

    // terminal jobs are never attempted again
    gateway.recover();
    let status = pipeline.worker().process_job(&job).await.unwrap();
    assert_eq!(status, None);
    assert_eq!(gateway.calls(), 5);
    assert_eq!(pipeline.worker().process_due_jobs().await.unwrap(), 0);
}

#[tokio::test]
async fn test_retry_sends_current_store_state() {
    let gateway = Arc::new(ScriptedGateway::always_failing());
    let (database, pipeline) = pipeline(&gateway, &SyncConfig::default());
    let service = pipeline.store_service();

    let store = service.create(NewStore::new("Eindhoven", 10)).await.unwrap();
    let create_job = only_job(&database);

    service
        .update(
            store.id.unwrap(),
            StoreChanges {
                name: None,
                quantity_products_in_stock: Some(25),
            },
        )
        .await
        .unwrap();
    assert_eq!(database.jobs().len(), 2);

    gateway.recover();
    let status = pipeline.worker().process_job(&create_job).await.unwrap();
    assert_eq!(status, Some(JobStatus::Succeeded));

    let snapshot = gateway.last_snapshot().unwrap();
    assert_eq!(snapshot.quantity_products_in_stock, 25);
    assert_eq!(snapshot.version, Some(1));
}

#[tokio::test]
async fn test_missing_store_fails_without_retry() {
    let gateway = Arc::new(ScriptedGateway::new());
    let (database, pipeline) = pipeline(&gateway, &SyncConfig::default());

    let event = ChangeEvent::new(999, ChangeType::Updated, Some(4));
    let job = SyncJob::from_event(&event, chrono::Utc::now());
    database.jobs().insert(&job).await.unwrap();

    let status = pipeline.worker().process_job(&job).await.unwrap();
    assert_eq!(status, Some(JobStatus::Failed));

    let job = current(&database, &job).await;
    assert_eq!(job.attempt_count, 1);
    assert_eq!(job.last_error.as_deref(), Some("Store not found: 999"));
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_attempts_call_gateway_once() {
    let gateway = Arc::new(ScriptedGateway::failing_first(1));
    let (database, pipeline) = pipeline(&gateway, &SyncConfig::default());

    pipeline
        .store_service()
        .create(NewStore::new("Leiden", 2))
        .await
        .unwrap();
    let job = only_job(&database);
    assert_eq!(job.status, JobStatus::Retry);

    let worker = pipeline.worker();
    let (first, second) = tokio::join!(worker.process_job(&job), worker.process_job(&job));
    let attempted: Vec<_> = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .collect();

    assert_eq!(attempted, vec![JobStatus::Succeeded]);
    assert_eq!(gateway.calls(), 2);
    assert_eq!(current(&database, &job).await.attempt_count, 2);
}

#[tokio::test]
async fn test_rolled_back_write_leaves_no_job() {
    let gateway = Arc::new(ScriptedGateway::new());
    let (database, pipeline) = pipeline(&gateway, &SyncConfig::default());
    let db: Arc<dyn Database> = Arc::new(database.clone());

    let mut uow = db.begin().await.unwrap();
    let store = uow.insert_store(&NewStore::new("Delft", 5)).await.unwrap();
    let event = pipeline
        .sync_service()
        .schedule_create_sync(uow.as_mut(), &store)
        .await
        .unwrap();
    assert!(event.is_some());
    uow.rollback().await.unwrap();

    assert!(database.jobs().is_empty());
    assert!(database.stores().is_empty());
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn test_store_without_identity_is_not_scheduled() {
    let gateway = Arc::new(ScriptedGateway::new());
    let (database, pipeline) = pipeline(&gateway, &SyncConfig::default());
    let db: Arc<dyn Database> = Arc::new(database.clone());

    let mut uow = db.begin().await.unwrap();
    let event = pipeline
        .sync_service()
        .schedule_update_sync(uow.as_mut(), &Store::new("Unsaved", 1))
        .await
        .unwrap();
    assert!(event.is_none());
    uow.commit().await.unwrap();

    assert!(database.jobs().is_empty());
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn test_duplicate_name_writes_nothing() {
    let gateway = Arc::new(ScriptedGateway::new());
    let (database, pipeline) = pipeline(&gateway, &SyncConfig::default());
    let service = pipeline.store_service();

    service.create(NewStore::new("Haarlem", 1)).await.unwrap();
    let err = service
        .create(NewStore::new("Haarlem", 2))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::StoreConflict(_)));
    assert_eq!(database.stores().len(), 1);
    assert_eq!(database.jobs().len(), 1);
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn test_update_of_unknown_store_is_rejected() {
    let gateway = Arc::new(ScriptedGateway::new());
    let (database, pipeline) = pipeline(&gateway, &SyncConfig::default());

    let err = pipeline
        .store_service()
        .update(42, StoreChanges::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::StoreNotFound(42)));
    assert!(database.jobs().is_empty());
}

#[tokio::test]
async fn test_scheduler_drives_failed_job_to_success() {
    let mut config = SyncConfig::default();
    config.worker.initial_backoff_ms = 10;
    config.worker.max_backoff_ms = 20;
    config.scheduler.poll_interval_ms = 10;

    let gateway = Arc::new(ScriptedGateway::failing_first(2));
    let (database, pipeline) = pipeline(&gateway, &config);

    pipeline
        .store_service()
        .create(NewStore::new("Zwolle", 7))
        .await
        .unwrap();
    let job = only_job(&database);
    assert_eq!(job.status, JobStatus::Retry);

    let handle = pipeline.scheduler().clone().start();
    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if current(&database, &job).await.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    handle.shutdown().await.unwrap();

    assert!(finished.is_ok(), "scheduler did not finish the job in time");
    let job = current(&database, &job).await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.attempt_count, 3);
    assert_eq!(gateway.calls(), 3);

    let stats = database.jobs().stats().await.unwrap();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.outstanding(), 0);
}
