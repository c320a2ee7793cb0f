//! Sync job status tracking

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a sync job
///
/// ```text
/// PENDING -> SUCCEEDED | RETRY | FAILED
/// RETRY   -> SUCCEEDED | RETRY | FAILED
/// ```
///
/// `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created, never attempted
    #[default]
    Pending,

    /// At least one attempt failed transiently; due again at `next_attempt_at`
    Retry,

    /// The legacy system accepted the change
    Succeeded,

    /// Attempts exhausted or a non-retryable failure occurred
    Failed,
}

impl JobStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [Self; 4] = [Self::Pending, Self::Retry, Self::Succeeded, Self::Failed];

    /// Check if the job is in a terminal state (succeeded or failed)
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Check if the job may be picked up by the worker once due
    #[must_use]
    pub const fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending | Self::Retry)
    }

    /// Persisted representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Retry => "RETRY",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }

    /// Get a human-readable status name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retry => "retry",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown job status: {0}")]
pub struct ParseJobStatusError(pub String);

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    /// Accepts the persisted form and the lowercase name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseJobStatusError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Retry.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_is_claimable() {
        assert!(JobStatus::Pending.is_claimable());
        assert!(JobStatus::Retry.is_claimable());
        assert!(!JobStatus::Succeeded.is_claimable());
        assert!(!JobStatus::Failed.is_claimable());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", JobStatus::Retry), "RETRY");
        assert_eq!(JobStatus::Succeeded.name(), "succeeded");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("PENDING".parse::<JobStatus>(), Ok(JobStatus::Pending));
        assert_eq!("failed".parse::<JobStatus>(), Ok(JobStatus::Failed));
        assert_eq!(" Retry ".parse::<JobStatus>(), Ok(JobStatus::Retry));
        assert!("RUNNING".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_serde_uses_persisted_form() {
        let json = serde_json::to_string(&JobStatus::Succeeded).unwrap();
        assert_eq!(json, "\"SUCCEEDED\"");
    }
}
