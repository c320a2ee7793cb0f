//! Pipeline assembly and runtime state
//!
//! [`SyncPipeline`] wires the worker, sync service, write path and scheduler
//! over any backend. [`SyncRuntime`] does the same over `PostgreSQL` and owns
//! the running scheduler.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::memory::MemoryDatabase;
use crate::postgres::{self, PgDatabase, PgSyncJobStore};
use crate::store::StoreService;
use crate::sync::{
    Database, LegacyGateway, SchedulerHandle, SyncJobStore, SyncScheduler, SyncService,
    SyncWorker, TempFileLegacyGateway,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

/// The pipeline's components, wired together
///
/// # Example
///
/// ```rust
/// use legacy_sync::config::SyncConfig;
/// use legacy_sync::memory::MemoryDatabase;
/// use legacy_sync::state::SyncPipeline;
/// use legacy_sync::sync::TempFileLegacyGateway;
/// use std::sync::Arc;
///
/// let database = MemoryDatabase::new();
/// let gateway = Arc::new(TempFileLegacyGateway::new(std::env::temp_dir()));
/// let pipeline = SyncPipeline::in_memory(&database, gateway, &SyncConfig::default());
/// assert_eq!(pipeline.worker().policy().max_attempts, 5);
/// ```
#[derive(Debug, Clone)]
pub struct SyncPipeline {
    worker: Arc<SyncWorker>,
    sync: SyncService,
    stores: StoreService,
    scheduler: SyncScheduler,
}

impl SyncPipeline {
    /// Wire the pipeline over arbitrary backends
    ///
    /// The worker re-reads stores through the locks `jobs` hands out, so
    /// `jobs` must see the same store table that `database` writes.
    #[must_use]
    pub fn new(
        database: Arc<dyn Database>,
        jobs: Arc<dyn SyncJobStore>,
        gateway: Arc<dyn LegacyGateway>,
        config: &SyncConfig,
    ) -> Self {
        let worker = Arc::new(SyncWorker::new(jobs, gateway, config.worker.retry_policy()));
        let sync = SyncService::new(Arc::clone(&worker));
        let stores = StoreService::new(database, sync.clone());
        let scheduler = SyncScheduler::new(Arc::clone(&worker), config.scheduler.poll_interval());
        Self {
            worker,
            sync,
            stores,
            scheduler,
        }
    }

    /// Wire the pipeline over an in-memory database
    #[must_use]
    pub fn in_memory(
        database: &MemoryDatabase,
        gateway: Arc<dyn LegacyGateway>,
        config: &SyncConfig,
    ) -> Self {
        Self::new(
            Arc::new(database.clone()),
            database.jobs(),
            gateway,
            config,
        )
    }

    /// Delivery worker
    #[must_use]
    pub const fn worker(&self) -> &Arc<SyncWorker> {
        &self.worker
    }

    /// Sync service for custom write paths
    #[must_use]
    pub const fn sync_service(&self) -> &SyncService {
        &self.sync
    }

    /// Store write path
    #[must_use]
    pub const fn store_service(&self) -> &StoreService {
        &self.stores
    }

    /// Scheduler, not yet started
    #[must_use]
    pub const fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }
}

/// Running pipeline over `PostgreSQL`
pub struct SyncRuntime {
    config: Arc<SyncConfig>,
    pool: PgPool,
    jobs: Arc<PgSyncJobStore>,
    pipeline: SyncPipeline,
    scheduler: Option<SchedulerHandle>,
}

impl std::fmt::Debug for SyncRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRuntime")
            .field("config", &self.config)
            .field("scheduler_running", &self.is_scheduler_running())
            .finish_non_exhaustive()
    }
}

impl SyncRuntime {
    /// Connect to the database, run migrations if configured and wire the
    /// pipeline with the file-based legacy gateway
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or a migration fails.
    pub async fn connect(config: SyncConfig) -> SyncResult<Self> {
        let pool = postgres::connect(&config.database).await?;
        if config.database.run_migrations {
            postgres::migrate(&pool).await?;
        }
        let gateway = Arc::new(TempFileLegacyGateway::from_settings(&config.gateway));
        Ok(Self::with_gateway(config, pool, gateway))
    }

    /// Wire the pipeline over an existing pool and gateway
    #[must_use]
    pub fn with_gateway(config: SyncConfig, pool: PgPool, gateway: Arc<dyn LegacyGateway>) -> Self {
        let jobs = Arc::new(PgSyncJobStore::new(pool.clone()));
        let pipeline = SyncPipeline::new(
            Arc::new(PgDatabase::new(pool.clone())),
            Arc::clone(&jobs) as Arc<dyn SyncJobStore>,
            gateway,
            &config,
        );
        Self {
            config: Arc::new(config),
            pool,
            jobs,
            pipeline,
            scheduler: None,
        }
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Connection pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Job store
    #[must_use]
    pub const fn jobs(&self) -> &Arc<PgSyncJobStore> {
        &self.jobs
    }

    /// Wired pipeline
    #[must_use]
    pub const fn pipeline(&self) -> &SyncPipeline {
        &self.pipeline
    }

    /// Start the background scheduler
    ///
    /// Returns `false` if it is already running or disabled in configuration.
    pub fn start_scheduler(&mut self) -> bool {
        if self.scheduler.is_some() {
            return false;
        }
        if !self.config.scheduler.enabled {
            warn!("Legacy sync scheduler disabled in configuration");
            return false;
        }
        self.scheduler = Some(self.pipeline.scheduler().clone().start());
        true
    }

    /// Check if the background scheduler is running
    #[must_use]
    pub fn is_scheduler_running(&self) -> bool {
        self.scheduler
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the scheduler, wait for the in-flight run and close the pool
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler task failed.
    pub async fn shutdown(mut self) -> SyncResult<()> {
        if let Some(handle) = self.scheduler.take() {
            handle.shutdown().await?;
        }
        self.pool.close().await;
        info!("Legacy sync runtime stopped");
        Ok(())
    }
}
