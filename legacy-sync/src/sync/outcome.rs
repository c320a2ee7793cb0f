//! Result of a single delivery attempt

use serde::{Deserialize, Serialize};

/// Outcome of one attempt to deliver a change to the legacy system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The legacy system accepted the change
    Success,
    /// Delivery failed but may succeed later
    TransientFailure(String),
    /// Delivery can never succeed; retrying is pointless
    NonRetryableFailure(String),
}

impl AttemptOutcome {
    /// Check if the attempt succeeded
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Check if the failure may be retried
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFailure(_))
    }

    /// Failure reason, if any
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::TransientFailure(reason) | Self::NonRetryableFailure(reason) => Some(reason),
        }
    }
}
