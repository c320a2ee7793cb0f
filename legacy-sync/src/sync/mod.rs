//! Legacy synchronization pipeline
//!
//! Store changes reach the legacy system through a transactional outbox:
//!
//! 1. The write path calls [`SyncService`], which stages a [`SyncJob`] in the
//!    same [`UnitOfWork`] as the store write.
//! 2. After commit, one inline attempt runs through the [`SyncWorker`].
//! 3. Jobs that failed transiently are picked up again by the
//!    [`SyncScheduler`] once their backoff has elapsed, until they succeed or
//!    exhaust their attempts.
//!
//! A rolled back write leaves neither a job nor a gateway call behind, and a
//! crash after commit leaves a due job for the scheduler.

pub mod cancellation;
pub mod event;
pub mod gateway;
pub mod job;
pub mod observability;
pub mod outbox;
pub mod outcome;
pub mod policy;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod snapshot;
pub mod status;
pub mod worker;

pub use cancellation::CancellationToken;
pub use event::{ChangeEvent, ChangeType, UnknownChangeType};
pub use gateway::{LegacyGateway, LegacyGatewayError, TempFileLegacyGateway};
pub use job::{SyncJob, SyncJobId, LAST_ERROR_MAX_CHARS};
pub use observability::AttemptContext;
pub use outbox::{CommitHook, CommitHooks, Database, UnitOfWork};
pub use outcome::AttemptOutcome;
pub use policy::RetryPolicy;
pub use repository::{JobFilter, JobStats, LockedSyncJob, SyncJobStore, DEFAULT_LIST_LIMIT};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use service::SyncService;
pub use snapshot::StoreSnapshot;
pub use status::{JobStatus, ParseJobStatusError};
pub use worker::SyncWorker;

#[cfg(test)]
pub use gateway::MockLegacyGateway;
