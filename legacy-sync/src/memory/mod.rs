//! In-process backend
//!
//! Mirrors the Postgres backend closely enough to exercise the whole pipeline
//! without a database: every job row carries its own async mutex standing in
//! for the row lock, `try_lock` stands in for `SKIP LOCKED`, and a unit of
//! work buffers its writes until commit.

use crate::error::{SyncError, SyncResult};
use crate::store::{NewStore, Store, StoreReader};
use crate::sync::{
    CommitHook, CommitHooks, Database, JobFilter, JobStats, LockedSyncJob, SyncJob, SyncJobId,
    SyncJobStore, UnitOfWork,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug)]
struct JobRow {
    committed: RwLock<SyncJob>,
    lock: Arc<Mutex<()>>,
}

/// Job store kept in memory
///
/// Locked jobs re-read stores through `stores`, the way the `PostgreSQL`
/// backend reads them on the lock's transaction.
pub struct MemorySyncJobStore {
    rows: RwLock<HashMap<SyncJobId, Arc<JobRow>>>,
    stores: Arc<dyn StoreReader>,
}

impl std::fmt::Debug for MemorySyncJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySyncJobStore")
            .field("jobs", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for MemorySyncJobStore {
    fn default() -> Self {
        Self::with_reader(Arc::new(MemoryStoreRepository::new()))
    }
}

impl MemorySyncJobStore {
    /// Create an empty store over an empty store table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose locked jobs read stores from `stores`
    #[must_use]
    pub fn with_reader(stores: Arc<dyn StoreReader>) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            stores,
        }
    }

    /// Number of jobs
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Check if no jobs exist
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Committed state of every job, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<SyncJob> {
        let mut jobs: Vec<SyncJob> = self
            .rows
            .read()
            .values()
            .map(|row| row.committed.read().clone())
            .collect();
        jobs.sort_by_key(|job| (job.created_at, job.id));
        jobs
    }

    fn row(&self, id: SyncJobId) -> Option<Arc<JobRow>> {
        self.rows.read().get(&id).cloned()
    }

    fn check_new(rows: &HashMap<SyncJobId, Arc<JobRow>>, jobs: &[SyncJob]) -> SyncResult<()> {
        for (index, job) in jobs.iter().enumerate() {
            if rows.contains_key(&job.id) || jobs[..index].iter().any(|other| other.id == job.id) {
                return Err(SyncError::DuplicateJob(job.id));
            }
        }
        Ok(())
    }

    /// Insert every job or none of them
    fn insert_all(&self, jobs: &[SyncJob]) -> SyncResult<()> {
        let mut rows = self.rows.write();
        Self::check_new(&rows, jobs)?;
        for job in jobs {
            rows.insert(
                job.id,
                Arc::new(JobRow {
                    committed: RwLock::new(job.clone()),
                    lock: Arc::new(Mutex::new(())),
                }),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl SyncJobStore for MemorySyncJobStore {
    async fn insert(&self, job: &SyncJob) -> SyncResult<()> {
        self.insert_all(std::slice::from_ref(job))
    }

    async fn find(&self, id: SyncJobId) -> SyncResult<Option<SyncJob>> {
        Ok(self.row(id).map(|row| row.committed.read().clone()))
    }

    async fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> SyncResult<Vec<SyncJob>> {
        let rows: Vec<Arc<JobRow>> = self.rows.read().values().cloned().collect();
        let mut due: Vec<SyncJob> = rows
            .iter()
            .filter(|row| row.lock.try_lock().is_ok())
            .map(|row| row.committed.read().clone())
            .filter(|job| job.is_due(now))
            .collect();
        due.sort_by_key(|job| (job.created_at, job.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn lock(&self, id: SyncJobId) -> SyncResult<Option<Box<dyn LockedSyncJob>>> {
        let Some(row) = self.row(id) else {
            return Ok(None);
        };
        let guard = Arc::clone(&row.lock).lock_owned().await;
        let job = row.committed.read().clone();
        Ok(Some(Box::new(MemoryLockedSyncJob {
            row,
            job,
            stores: Arc::clone(&self.stores),
            _guard: guard,
        })))
    }

    async fn list(&self, filter: &JobFilter) -> SyncResult<Vec<SyncJob>> {
        let mut jobs: Vec<SyncJob> = self
            .snapshot()
            .into_iter()
            .filter(|job| filter.matches(job))
            .collect();
        jobs.reverse();
        jobs.truncate(filter.limit);
        Ok(jobs)
    }

    async fn stats(&self) -> SyncResult<JobStats> {
        let mut stats = JobStats::default();
        for row in self.rows.read().values() {
            stats.record(row.committed.read().status, 1);
        }
        Ok(stats)
    }
}

struct MemoryLockedSyncJob {
    row: Arc<JobRow>,
    job: SyncJob,
    stores: Arc<dyn StoreReader>,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl LockedSyncJob for MemoryLockedSyncJob {
    fn job(&self) -> &SyncJob {
        &self.job
    }

    async fn find_store(&mut self, store_id: i64) -> SyncResult<Option<Store>> {
        self.stores.find_store(store_id).await
    }

    async fn save(self: Box<Self>, job: &SyncJob) -> SyncResult<SyncJob> {
        let mut committed = self.row.committed.write();
        if committed.concurrency_token != self.job.concurrency_token {
            return Err(SyncError::ConcurrencyConflict(job.id));
        }
        let mut saved = job.clone();
        saved.concurrency_token = self.job.concurrency_token + 1;
        *committed = saved.clone();
        Ok(saved)
    }

    async fn release(self: Box<Self>) -> SyncResult<()> {
        Ok(())
    }
}

/// Store table kept in memory
#[derive(Debug)]
pub struct MemoryStoreRepository {
    stores: RwLock<HashMap<i64, Store>>,
    next_id: AtomicI64,
}

impl Default for MemoryStoreRepository {
    fn default() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemoryStoreRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a store directly, outside any unit of work
    ///
    /// Assigns an id (and version 0) to stores without one. Returns the
    /// stored entity.
    pub fn save(&self, mut store: Store) -> Store {
        if store.id.is_none() {
            store.id = Some(self.next_id());
            store.version = Some(store.version.unwrap_or(0));
        }
        if let Some(id) = store.id {
            self.stores.write().insert(id, store.clone());
        }
        store
    }

    /// Delete a store directly
    pub fn remove(&self, id: i64) -> Option<Store> {
        self.stores.write().remove(&id)
    }

    /// Read a committed store
    #[must_use]
    pub fn get(&self, id: i64) -> Option<Store> {
        self.stores.read().get(&id).cloned()
    }

    /// Number of stores
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.read().len()
    }

    /// Check if no stores exist
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.read().is_empty()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn name_taken(&self, name: &str, except: Option<i64>) -> bool {
        self.stores
            .read()
            .values()
            .any(|store| store.name == name && store.id != except)
    }

    /// Apply a unit of work's buffered store writes together with `then`
    ///
    /// `bases` holds the committed version each updated store was read at.
    /// Every update must still find that version and no name may be taken
    /// by a store outside `staged`. Nothing is written if a check or `then`
    /// fails; the store table stays locked throughout.
    fn apply_writes(
        &self,
        staged: HashMap<i64, Store>,
        bases: &HashMap<i64, Option<i64>>,
        then: impl FnOnce() -> SyncResult<()>,
    ) -> SyncResult<()> {
        let mut committed = self.stores.write();
        for (id, base) in bases {
            if committed.get(id).map(|current| current.version) != Some(*base) {
                return Err(SyncError::StoreConflict(format!(
                    "store {id} was modified concurrently"
                )));
            }
        }
        for (id, store) in &staged {
            let taken = committed.values().any(|other| {
                other.name == store.name
                    && other.id != Some(*id)
                    && other.id.is_none_or(|other_id| !staged.contains_key(&other_id))
            });
            if taken {
                return Err(SyncError::StoreConflict(format!(
                    "store named '{}' already exists",
                    store.name
                )));
            }
        }
        then()?;
        committed.extend(staged);
        Ok(())
    }
}

#[async_trait]
impl StoreReader for MemoryStoreRepository {
    async fn find_store(&self, id: i64) -> SyncResult<Option<Store>> {
        Ok(self.get(id))
    }
}

/// In-memory database handing out [`MemoryUnitOfWork`]s
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    stores: Arc<MemoryStoreRepository>,
    jobs: Arc<MemorySyncJobStore>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        let stores = Arc::new(MemoryStoreRepository::new());
        let jobs = Arc::new(MemorySyncJobStore::with_reader(
            Arc::clone(&stores) as Arc<dyn StoreReader>
        ));
        Self { stores, jobs }
    }
}

impl MemoryDatabase {
    /// Create an empty database
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store table
    #[must_use]
    pub fn stores(&self) -> Arc<MemoryStoreRepository> {
        Arc::clone(&self.stores)
    }

    /// Job table
    #[must_use]
    pub fn jobs(&self) -> Arc<MemorySyncJobStore> {
        Arc::clone(&self.jobs)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> SyncResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(MemoryUnitOfWork::new(self.clone())))
    }
}

/// Buffered unit of work over a [`MemoryDatabase`]
#[derive(Debug)]
pub struct MemoryUnitOfWork {
    database: MemoryDatabase,
    stores: HashMap<i64, Store>,
    bases: HashMap<i64, Option<i64>>,
    jobs: Vec<SyncJob>,
    hooks: CommitHooks,
}

impl MemoryUnitOfWork {
    fn new(database: MemoryDatabase) -> Self {
        Self {
            database,
            stores: HashMap::new(),
            bases: HashMap::new(),
            jobs: Vec::new(),
            hooks: CommitHooks::new(),
        }
    }

    fn visible(&self, id: i64) -> Option<Store> {
        self.stores
            .get(&id)
            .cloned()
            .or_else(|| self.database.stores.get(id))
    }

    fn name_taken(&self, name: &str, except: Option<i64>) -> bool {
        self.stores
            .values()
            .any(|store| store.name == name && store.id != except)
            || self.database.stores.name_taken(name, except)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_store(&mut self, store: &NewStore) -> SyncResult<Store> {
        if self.name_taken(&store.name, None) {
            return Err(SyncError::StoreConflict(format!(
                "store named '{}' already exists",
                store.name
            )));
        }
        let id = self.database.stores.next_id();
        let created = Store {
            id: Some(id),
            name: store.name.clone(),
            quantity_products_in_stock: store.quantity_products_in_stock,
            version: Some(0),
        };
        self.stores.insert(id, created.clone());
        Ok(created)
    }

    async fn load_store(&mut self, id: i64) -> SyncResult<Option<Store>> {
        Ok(self.visible(id))
    }

    async fn update_store(&mut self, store: &Store) -> SyncResult<Store> {
        let id = store
            .id
            .ok_or_else(|| SyncError::StoreConflict("cannot update a store without id".into()))?;
        let current = self.visible(id).ok_or(SyncError::StoreNotFound(id))?;
        if current.version != store.version {
            return Err(SyncError::StoreConflict(format!(
                "store {id} was modified concurrently"
            )));
        }
        if self.name_taken(&store.name, Some(id)) {
            return Err(SyncError::StoreConflict(format!(
                "store named '{}' already exists",
                store.name
            )));
        }
        if !self.stores.contains_key(&id) {
            self.bases.insert(id, current.version);
        }
        let mut updated = store.clone();
        updated.version = Some(store.version.unwrap_or(0) + 1);
        self.stores.insert(id, updated.clone());
        Ok(updated)
    }

    async fn stage_job(&mut self, job: &SyncJob) -> SyncResult<()> {
        self.jobs.push(job.clone());
        Ok(())
    }

    fn after_commit(&mut self, hook: CommitHook) {
        self.hooks.push(hook);
    }

    async fn commit(self: Box<Self>) -> SyncResult<()> {
        let Self {
            database,
            stores,
            bases,
            jobs,
            hooks,
        } = *self;

        database
            .stores
            .apply_writes(stores, &bases, || database.jobs.insert_all(&jobs))?;
        debug!(jobs = jobs.len(), "Memory unit of work committed");

        hooks.run().await;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> SyncResult<()> {
        let Self {
            stores, jobs, hooks, ..
        } = *self;
        let discarded = hooks.discard();
        debug!(
            stores = stores.len(),
            jobs = jobs.len(),
            hooks = discarded,
            "Memory unit of work rolled back"
        );
        Ok(())
    }
}
