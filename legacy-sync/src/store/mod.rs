//! Store entity and the write path that keeps the legacy system in sync
//!
//! [`StoreService`] performs a store write and schedules its synchronization
//! inside one unit of work, so the legacy system only ever learns about
//! committed stores.

use crate::error::{SyncError, SyncResult};
use crate::sync::{ChangeEvent, Database, SyncService, UnitOfWork};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// A store of the fulfilment backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    /// Identity, `None` until the store is persisted
    pub id: Option<i64>,
    /// Unique name
    pub name: String,
    /// Stock level
    pub quantity_products_in_stock: i32,
    /// Optimistic version, bumped on every update
    pub version: Option<i64>,
}

impl Store {
    /// A store that has not been persisted yet
    #[must_use]
    pub fn new(name: impl Into<String>, quantity_products_in_stock: i32) -> Self {
        Self {
            id: None,
            name: name.into(),
            quantity_products_in_stock,
            version: None,
        }
    }
}

/// Input for creating a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStore {
    /// Unique name
    pub name: String,
    /// Initial stock level
    pub quantity_products_in_stock: i32,
}

impl NewStore {
    /// Create the input for a new store
    #[must_use]
    pub fn new(name: impl Into<String>, quantity_products_in_stock: i32) -> Self {
        Self {
            name: name.into(),
            quantity_products_in_stock,
        }
    }
}

/// Partial update of a store; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreChanges {
    /// New name
    pub name: Option<String>,
    /// New stock level
    pub quantity_products_in_stock: Option<i32>,
}

impl StoreChanges {
    /// Check if nothing would change
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.quantity_products_in_stock.is_none()
    }

    fn apply_to(self, store: &mut Store) {
        if let Some(name) = self.name {
            store.name = name;
        }
        if let Some(quantity) = self.quantity_products_in_stock {
            store.quantity_products_in_stock = quantity;
        }
    }
}

/// Reads committed stores
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreReader: Send + Sync {
    /// Find a committed store by id
    async fn find_store(&self, id: i64) -> SyncResult<Option<Store>>;
}

/// Store write path with legacy synchronization
#[derive(Clone)]
pub struct StoreService {
    database: Arc<dyn Database>,
    sync: SyncService,
}

impl std::fmt::Debug for StoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreService")
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

impl StoreService {
    /// Create the write path over `database`
    #[must_use]
    pub fn new(database: Arc<dyn Database>, sync: SyncService) -> Self {
        Self { database, sync }
    }

    /// Create a store and schedule its synchronization
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::StoreConflict`] for a duplicate name, or any
    /// storage error. Nothing is written and nothing is synchronized on error.
    pub async fn create(&self, store: NewStore) -> SyncResult<Store> {
        let mut uow = self.database.begin().await?;
        let result = async {
            let created = uow.insert_store(&store).await?;
            let event = self.sync.schedule_create_sync(uow.as_mut(), &created).await?;
            Ok::<_, SyncError>((created, event))
        }
        .await;

        let (created, event) = finish(uow, result).await?;
        log_written("Store created", &created, event.as_ref());
        Ok(created)
    }

    /// Update a store and schedule its synchronization
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::StoreNotFound`] for an unknown id,
    /// [`SyncError::StoreConflict`] for a duplicate name or a concurrent
    /// update, or any storage error. Nothing is written and nothing is
    /// synchronized on error.
    pub async fn update(&self, id: i64, changes: StoreChanges) -> SyncResult<Store> {
        let mut uow = self.database.begin().await?;
        let result = async {
            let mut store = uow
                .load_store(id)
                .await?
                .ok_or(SyncError::StoreNotFound(id))?;
            changes.apply_to(&mut store);
            let updated = uow.update_store(&store).await?;
            let event = self.sync.schedule_update_sync(uow.as_mut(), &updated).await?;
            Ok::<_, SyncError>((updated, event))
        }
        .await;

        let (updated, event) = finish(uow, result).await?;
        log_written("Store updated", &updated, event.as_ref());
        Ok(updated)
    }
}

async fn finish<T>(uow: Box<dyn UnitOfWork>, result: SyncResult<T>) -> SyncResult<T> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

fn log_written(message: &str, store: &Store, event: Option<&ChangeEvent>) {
    info!(
        store_id = ?store.id,
        name = %store.name,
        version = ?store.version,
        correlation_id = event.map_or("", |e| e.correlation_id.as_str()),
        "{message}"
    );
}
