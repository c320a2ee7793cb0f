//! `PostgreSQL` backend
//!
//! Jobs live in `store_legacy_sync_job`. Batch selection uses
//! `FOR UPDATE SKIP LOCKED` inside a short transaction so concurrent workers
//! never wait on each other; a single job is processed under a blocking
//! `FOR UPDATE` lock held until its outcome is saved.
//!
//! An attempt holds exactly one pooled connection: the store is re-read on the
//! transaction that holds the job lock. The write path holds at most one more
//! (the unit of work) and releases it before its inline attempt starts, so a
//! pool of one connection is enough for a single writer.

use crate::config::DatabaseSettings;
use crate::error::{SyncError, SyncResult};
use crate::store::{NewStore, Store, StoreReader};
use crate::sync::{
    CommitHook, CommitHooks, Database, JobFilter, JobStats, JobStatus, LockedSyncJob, SyncJob,
    SyncJobId, SyncJobStore, UnitOfWork,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgExecutor, PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

/// Embedded schema migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open a connection pool
///
/// # Errors
///
/// Returns [`SyncError::Database`] if the database cannot be reached.
pub async fn connect(settings: &DatabaseSettings) -> SyncResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.url)
        .await?;
    debug!(max_connections = settings.max_connections, "Database pool created");
    Ok(pool)
}

/// Apply pending migrations
///
/// # Errors
///
/// Returns [`SyncError::Migration`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> SyncResult<()> {
    MIGRATOR.run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

const SELECT_JOB: &str = "SELECT id, store_id, change_type, expected_version, correlation_id, \
     status, attempt_count, next_attempt_at, created_at, updated_at, last_error, concurrency_token \
     FROM store_legacy_sync_job";

const INSERT_JOB: &str = "INSERT INTO store_legacy_sync_job (id, store_id, change_type, \
     expected_version, correlation_id, status, attempt_count, next_attempt_at, created_at, \
     updated_at, last_error, concurrency_token) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";

const UPDATE_JOB: &str = "UPDATE store_legacy_sync_job \
     SET status = $2, attempt_count = $3, next_attempt_at = $4, updated_at = $5, \
         last_error = $6, concurrency_token = concurrency_token + 1 \
     WHERE id = $1 AND concurrency_token = $7 \
     RETURNING id, store_id, change_type, expected_version, correlation_id, status, \
         attempt_count, next_attempt_at, created_at, updated_at, last_error, concurrency_token";

const STORE_COLUMNS: &str = "id, name, quantity_products_in_stock, version";

#[derive(Debug, FromRow)]
struct SyncJobRow {
    id: Uuid,
    store_id: i64,
    change_type: String,
    expected_version: Option<i64>,
    correlation_id: String,
    status: String,
    attempt_count: i32,
    next_attempt_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_error: Option<String>,
    concurrency_token: i64,
}

impl TryFrom<SyncJobRow> for SyncJob {
    type Error = SyncError;

    fn try_from(row: SyncJobRow) -> Result<Self, Self::Error> {
        let status: JobStatus = row
            .status
            .parse()
            .map_err(|err| SyncError::InvalidRow(format!("job {}: {err}", row.id)))?;
        let attempt_count = u32::try_from(row.attempt_count).map_err(|_| {
            SyncError::InvalidRow(format!(
                "job {}: negative attempt count {}",
                row.id, row.attempt_count
            ))
        })?;
        Ok(Self {
            id: row.id.into(),
            store_id: row.store_id,
            change_type: row.change_type,
            expected_version: row.expected_version,
            correlation_id: row.correlation_id,
            status,
            attempt_count,
            next_attempt_at: row.next_attempt_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_error: row.last_error,
            concurrency_token: row.concurrency_token,
        })
    }
}

#[derive(Debug, FromRow)]
struct StoreRow {
    id: i64,
    name: String,
    quantity_products_in_stock: i32,
    version: i64,
}

impl From<StoreRow> for Store {
    fn from(row: StoreRow) -> Self {
        Self {
            id: Some(row.id),
            name: row.name,
            quantity_products_in_stock: row.quantity_products_in_stock,
            version: Some(row.version),
        }
    }
}

fn attempt_count(job: &SyncJob) -> i32 {
    i32::try_from(job.attempt_count).unwrap_or(i32::MAX)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

async fn find_store<'c>(executor: impl PgExecutor<'c>, id: i64) -> SyncResult<Option<Store>> {
    let row: Option<StoreRow> =
        sqlx::query_as(&format!("SELECT {STORE_COLUMNS} FROM store WHERE id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await?;
    Ok(row.map(Store::from))
}

async fn insert_job<'c>(executor: impl PgExecutor<'c>, job: &SyncJob) -> SyncResult<()> {
    sqlx::query(INSERT_JOB)
        .bind(Uuid::from(job.id))
        .bind(job.store_id)
        .bind(&job.change_type)
        .bind(job.expected_version)
        .bind(&job.correlation_id)
        .bind(job.status.as_str())
        .bind(attempt_count(job))
        .bind(job.next_attempt_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.last_error.as_deref())
        .bind(job.concurrency_token)
        .execute(executor)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                SyncError::DuplicateJob(job.id)
            } else {
                err.into()
            }
        })?;
    Ok(())
}

/// Job store backed by `store_legacy_sync_job`
#[derive(Debug, Clone)]
pub struct PgSyncJobStore {
    pool: PgPool,
}

impl PgSyncJobStore {
    /// Create a job store over `pool`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncJobStore for PgSyncJobStore {
    async fn insert(&self, job: &SyncJob) -> SyncResult<()> {
        insert_job(&self.pool, job).await
    }

    async fn find(&self, id: SyncJobId) -> SyncResult<Option<SyncJob>> {
        let row: Option<SyncJobRow> = sqlx::query_as(&format!("{SELECT_JOB} WHERE id = $1"))
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?;
        row.map(SyncJob::try_from).transpose()
    }

    async fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> SyncResult<Vec<SyncJob>> {
        let mut tx = self.pool.begin().await?;
        let rows: Vec<SyncJobRow> = sqlx::query_as(&format!(
            "{SELECT_JOB} WHERE status IN ('PENDING', 'RETRY') AND next_attempt_at <= $1 \
             ORDER BY created_at LIMIT $2 FOR UPDATE SKIP LOCKED"
        ))
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.into_iter().map(SyncJob::try_from).collect()
    }

    async fn lock(&self, id: SyncJobId) -> SyncResult<Option<Box<dyn LockedSyncJob>>> {
        let mut tx = self.pool.begin().await?;
        let row: Option<SyncJobRow> =
            sqlx::query_as(&format!("{SELECT_JOB} WHERE id = $1 FOR UPDATE"))
                .bind(Uuid::from(id))
                .fetch_optional(&mut *tx)
                .await?;

        match row {
            Some(row) => Ok(Some(Box::new(PgLockedSyncJob {
                tx,
                job: row.try_into()?,
            }))),
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }

    async fn list(&self, filter: &JobFilter) -> SyncResult<Vec<SyncJob>> {
        let rows: Vec<SyncJobRow> = sqlx::query_as(&format!(
            "{SELECT_JOB} WHERE ($1::text IS NULL OR status = $1) \
             AND ($2::bigint IS NULL OR store_id = $2) \
             ORDER BY created_at DESC LIMIT $3"
        ))
        .bind(filter.status.map(|status| status.as_str()))
        .bind(filter.store_id)
        .bind(i64::try_from(filter.limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SyncJob::try_from).collect()
    }

    async fn stats(&self) -> SyncResult<JobStats> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM store_legacy_sync_job GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = JobStats::default();
        for (status, count) in rows {
            let status: JobStatus = status
                .parse()
                .map_err(|err| SyncError::InvalidRow(format!("{err}")))?;
            stats.record(status, u64::try_from(count).unwrap_or(0));
        }
        Ok(stats)
    }
}

struct PgLockedSyncJob {
    tx: Transaction<'static, Postgres>,
    job: SyncJob,
}

#[async_trait]
impl LockedSyncJob for PgLockedSyncJob {
    fn job(&self) -> &SyncJob {
        &self.job
    }

    async fn find_store(&mut self, store_id: i64) -> SyncResult<Option<Store>> {
        find_store(&mut *self.tx, store_id).await
    }

    async fn save(self: Box<Self>, job: &SyncJob) -> SyncResult<SyncJob> {
        let Self { mut tx, job: locked } = *self;
        let row: Option<SyncJobRow> = sqlx::query_as(UPDATE_JOB)
            .bind(Uuid::from(job.id))
            .bind(job.status.as_str())
            .bind(attempt_count(job))
            .bind(job.next_attempt_at)
            .bind(job.updated_at)
            .bind(job.last_error.as_deref())
            .bind(locked.concurrency_token)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(SyncError::ConcurrencyConflict(job.id));
        };
        tx.commit().await?;
        row.try_into()
    }

    async fn release(self: Box<Self>) -> SyncResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Reads committed stores from the `store` table
#[derive(Debug, Clone)]
pub struct PgStoreRepository {
    pool: PgPool,
}

impl PgStoreRepository {
    /// Create a repository over `pool`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreReader for PgStoreRepository {
    async fn find_store(&self, id: i64) -> SyncResult<Option<Store>> {
        find_store(&self.pool, id).await
    }
}

/// Database handing out transactional units of work
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Create a database over `pool`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> SyncResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork {
            tx,
            hooks: CommitHooks::new(),
        }))
    }
}

/// Unit of work over one database transaction
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    hooks: CommitHooks,
}

impl PgUnitOfWork {
    /// Connection of the transaction, for additional business writes
    pub fn connection(&mut self) -> &mut sqlx::PgConnection {
        &mut self.tx
    }
}

impl std::fmt::Debug for PgUnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgUnitOfWork")
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

fn store_conflict(name: &str) -> impl FnOnce(sqlx::Error) -> SyncError + '_ {
    move |err| {
        if is_unique_violation(&err) {
            SyncError::StoreConflict(format!("store named '{name}' already exists"))
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_store(&mut self, store: &NewStore) -> SyncResult<Store> {
        let row: StoreRow = sqlx::query_as(&format!(
            "INSERT INTO store (name, quantity_products_in_stock, version) \
             VALUES ($1, $2, 0) RETURNING {STORE_COLUMNS}"
        ))
        .bind(&store.name)
        .bind(store.quantity_products_in_stock)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(store_conflict(&store.name))?;
        Ok(row.into())
    }

    async fn load_store(&mut self, id: i64) -> SyncResult<Option<Store>> {
        let row: Option<StoreRow> = sqlx::query_as(&format!(
            "SELECT {STORE_COLUMNS} FROM store WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Store::from))
    }

    async fn update_store(&mut self, store: &Store) -> SyncResult<Store> {
        let id = store
            .id
            .ok_or_else(|| SyncError::StoreConflict("cannot update a store without id".into()))?;
        let row: Option<StoreRow> = sqlx::query_as(&format!(
            "UPDATE store SET name = $2, quantity_products_in_stock = $3, version = version + 1 \
             WHERE id = $1 AND version = $4 RETURNING {STORE_COLUMNS}"
        ))
        .bind(id)
        .bind(&store.name)
        .bind(store.quantity_products_in_stock)
        .bind(store.version.unwrap_or(0))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(store_conflict(&store.name))?;

        row.map(Store::from).ok_or_else(|| {
            SyncError::StoreConflict(format!("store {id} was modified concurrently"))
        })
    }

    async fn stage_job(&mut self, job: &SyncJob) -> SyncResult<()> {
        insert_job(&mut *self.tx, job).await
    }

    fn after_commit(&mut self, hook: CommitHook) {
        self.hooks.push(hook);
    }

    async fn commit(self: Box<Self>) -> SyncResult<()> {
        let Self { tx, hooks } = *self;
        tx.commit().await?;
        hooks.run().await;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> SyncResult<()> {
        let Self { tx, hooks } = *self;
        hooks.discard();
        tx.rollback().await?;
        Ok(())
    }
}
