//! Error types and error handling

use crate::sync::SyncJobId;
use thiserror::Error;

/// Result alias used across the crate
pub type SyncResult<T> = Result<T, SyncError>;

/// Synchronization pipeline error type
///
/// Delivery failures are not represented here: the worker records them on the
/// job itself (see [`crate::sync::AttemptOutcome`]). These variants cover
/// infrastructure problems and contract violations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A snapshot was requested for a store without identity or name
    #[error("Invalid store snapshot: {0}")]
    InvalidSnapshot(String),

    /// A persisted job row could not be mapped back to a job
    #[error("Invalid sync job row: {0}")]
    InvalidRow(String),

    /// The job row was advanced by another actor since it was read
    #[error("Sync job {0} was modified concurrently")]
    ConcurrencyConflict(SyncJobId),

    /// A job with the same id already exists
    #[error("Sync job {0} already exists")]
    DuplicateJob(SyncJobId),

    /// Store write rejected (duplicate name or stale version)
    #[error("Store conflict: {0}")]
    StoreConflict(String),

    /// Store does not exist
    #[error("Store not found: {0}")]
    StoreNotFound(i64),

    /// The unit of work was used after it finished
    #[error("Unit of work already finished")]
    UnitOfWorkFinished,

    /// Background scheduler failure
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl From<figment::Error> for SyncError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl SyncError {
    /// Check whether this error is an optimistic concurrency conflict
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SyncError::StoreNotFound(42);
        assert_eq!(err.to_string(), "Store not found: 42");

        let err = SyncError::Config("batch_size must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: batch_size must be positive"
        );
    }

    #[test]
    fn test_is_conflict() {
        let id = SyncJobId::new();
        assert!(SyncError::ConcurrencyConflict(id).is_conflict());
        assert!(!SyncError::DuplicateJob(id).is_conflict());
        assert!(!SyncError::StoreNotFound(1).is_conflict());
    }
}
