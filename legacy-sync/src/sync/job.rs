//! Durable sync job record and its state transitions

use super::event::{ChangeEvent, ChangeType, UnknownChangeType};
use super::status::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Longest `last_error` kept on a job, in characters
pub const LAST_ERROR_MAX_CHARS: usize = 2000;

/// Unique identifier for a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncJobId(Uuid);

impl SyncJobId {
    /// Create a new random job ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SyncJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SyncJobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<SyncJobId> for Uuid {
    fn from(id: SyncJobId) -> Self {
        id.0
    }
}

impl FromStr for SyncJobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One change awaiting delivery to the legacy system
///
/// Rows are never deleted; terminal jobs stay behind as an audit trail.
/// `change_type` keeps the persisted text so a row written by a newer
/// producer still loads and can be failed explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    /// Job identity
    pub id: SyncJobId,
    /// Store the change refers to
    pub store_id: i64,
    /// Persisted change type (`CREATED` / `UPDATED`)
    pub change_type: String,
    /// Store version observed by the writer
    pub expected_version: Option<i64>,
    /// Correlation id shared with the originating change event
    pub correlation_id: String,
    /// Lifecycle state
    pub status: JobStatus,
    /// Attempts made so far
    pub attempt_count: u32,
    /// Earliest time the job is due; the Unix epoch once terminal
    pub next_attempt_at: DateTime<Utc>,
    /// Creation time, drives batch ordering
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Reason of the most recent failed attempt
    pub last_error: Option<String>,
    /// Optimistic concurrency token, bumped on every persisted change
    pub concurrency_token: i64,
}

impl SyncJob {
    /// Create a pending job for a change event, due immediately
    #[must_use]
    pub fn from_event(event: &ChangeEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: SyncJobId::new(),
            store_id: event.store_id,
            change_type: event.change_type.as_str().to_string(),
            expected_version: event.expected_version,
            correlation_id: event.correlation_id.clone(),
            status: JobStatus::Pending,
            attempt_count: 0,
            next_attempt_at: now,
            created_at: now,
            updated_at: now,
            last_error: None,
            concurrency_token: 0,
        }
    }

    /// Parse the persisted change type
    ///
    /// # Errors
    ///
    /// Returns [`UnknownChangeType`] for values other than `CREATED` / `UPDATED`.
    pub fn parsed_change_type(&self) -> Result<ChangeType, UnknownChangeType> {
        self.change_type.parse()
    }

    /// Check if the worker may pick the job up at `now`
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable() && self.next_attempt_at <= now
    }

    pub(crate) fn begin_attempt(&mut self, now: DateTime<Utc>) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.updated_at = now;
    }

    pub(crate) fn mark_succeeded(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Succeeded;
        self.last_error = None;
        self.next_attempt_at = DateTime::<Utc>::UNIX_EPOCH;
        self.updated_at = now;
    }

    pub(crate) fn mark_failed(&mut self, reason: &str, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.last_error = Some(truncate_error(reason));
        self.next_attempt_at = DateTime::<Utc>::UNIX_EPOCH;
        self.updated_at = now;
    }

    pub(crate) fn schedule_retry(
        &mut self,
        reason: &str,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.status = JobStatus::Retry;
        self.last_error = Some(truncate_error(reason));
        self.next_attempt_at = next_attempt_at;
        self.updated_at = now;
    }
}

fn truncate_error(reason: &str) -> String {
    reason.chars().take(LAST_ERROR_MAX_CHARS).collect()
}
