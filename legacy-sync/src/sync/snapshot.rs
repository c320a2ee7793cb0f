//! Immutable view of a committed store, as handed to the legacy gateway

use crate::error::{SyncError, SyncResult};
use crate::store::Store;
use serde::{Deserialize, Serialize};

/// Committed store state at the moment of an attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Store identity
    pub id: i64,
    /// Store name, never empty
    pub name: String,
    /// Stock level
    pub quantity_products_in_stock: i32,
    /// Optimistic version of the store row, if any
    pub version: Option<i64>,
}

impl StoreSnapshot {
    /// Build a snapshot, rejecting a missing id or empty name
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidSnapshot`] when `id` is `None` or `name` is blank.
    pub fn new(
        id: Option<i64>,
        name: impl Into<String>,
        quantity_products_in_stock: i32,
        version: Option<i64>,
    ) -> SyncResult<Self> {
        let id = id.ok_or_else(|| SyncError::InvalidSnapshot("id must not be null".into()))?;
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SyncError::InvalidSnapshot(format!(
                "name must not be empty (store {id})"
            )));
        }
        Ok(Self {
            id,
            name,
            quantity_products_in_stock,
            version,
        })
    }

    /// Snapshot a store entity
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidSnapshot`] when the store has no identity or name.
    pub fn from_store(store: &Store) -> SyncResult<Self> {
        Self::new(
            store.id,
            store.name.clone(),
            store.quantity_products_in_stock,
            store.version,
        )
    }
}
