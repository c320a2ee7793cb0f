//! Testing utilities for legacy-sync pipelines
//!
//! This module provides helpers for exercising the pipeline in tests:
//! - [`ScriptedGateway`] - Legacy gateway with scripted failures that records every call
//! - [`TestDatabase`] - Throwaway `PostgreSQL` database with migrations applied
//!
//! Unlike the crate's mockall mocks, these are compiled into the library so
//! integration tests and downstream crates can use them.
//!
//! # Example
//!
//! ```rust
//! use legacy_sync::config::SyncConfig;
//! use legacy_sync::memory::MemoryDatabase;
//! use legacy_sync::state::SyncPipeline;
//! use legacy_sync::store::NewStore;
//! use legacy_sync::testing::ScriptedGateway;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let database = MemoryDatabase::new();
//! let gateway = Arc::new(ScriptedGateway::failing_first(1));
//! let pipeline = SyncPipeline::in_memory(&database, gateway.clone(), &SyncConfig::default());
//!
//! pipeline.store_service().create(NewStore::new("Utrecht", 4)).await?;
//! assert_eq!(gateway.create_calls(), 1);
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod gateway;

pub use database::TestDatabase;
pub use gateway::{GatewayCall, ScriptedGateway};
