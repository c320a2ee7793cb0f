//! legacy-sync: Durable synchronization of store changes to a legacy system
//!
//! Every create or update of a store is mirrored to a legacy system that may
//! be slow or unavailable. The pipeline is a transactional outbox:
//! - **Write path**: the store write and a sync job commit together, or not at all
//! - **Inline attempt**: one delivery attempt runs right after commit
//! - **Scheduler**: failed jobs are retried with exponential backoff until
//!   they succeed or exhaust their attempts
//!
//! The legacy system always receives the store as committed at the moment of
//! the attempt, never the state at enqueue time.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use legacy_sync::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::load()?;
//!     legacy_sync::observability::init(&config.logging)?;
//!
//!     let mut runtime = SyncRuntime::connect(config).await?;
//!     runtime.start_scheduler();
//!
//!     let store = runtime
//!         .pipeline()
//!         .store_service()
//!         .create(NewStore::new("Rotterdam", 12))
//!         .await?;
//!     tracing::info!(store_id = ?store.id, "Store created");
//!
//!     tokio::signal::ctrl_c().await?;
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`postgres`] - `PostgreSQL` via sqlx, with row locks for claiming jobs
//! - [`memory`] - In-process tables with the same locking semantics, for tests
//!   and embedding

// Lint configuration is handled at the workspace level in Cargo.toml
// Additional crate-specific allows:
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod memory;
pub mod observability;
pub mod postgres;
pub mod state;
pub mod store;
pub mod sync;
pub mod testing;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! # Examples
    //!
    //! ```rust
    //! use legacy_sync::prelude::*;
    //! ```

    // Configuration
    pub use crate::config::SyncConfig;

    // Error types
    pub use crate::error::{SyncError, SyncResult};

    // Application state
    pub use crate::state::{SyncPipeline, SyncRuntime};

    // Store write path
    pub use crate::store::{NewStore, Store, StoreChanges, StoreReader, StoreService};

    // Synchronization pipeline
    pub use crate::sync::{
        AttemptOutcome, ChangeEvent, ChangeType, Database, JobFilter, JobStats, JobStatus,
        LegacyGateway, LegacyGatewayError, RetryPolicy, StoreSnapshot, SyncJob, SyncJobId,
        SyncJobStore, SyncScheduler, SyncService, SyncWorker, UnitOfWork,
    };
}
