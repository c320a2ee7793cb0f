//! Store change events

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of store change that must reach the legacy system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    /// The store was created
    Created,
    /// The store was updated
    Updated,
}

impl ChangeType {
    /// Persisted representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for change types the worker does not know how to deliver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown store change type: {0}")]
pub struct UnknownChangeType(pub String);

impl FromStr for ChangeType {
    type Err = UnknownChangeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "UPDATED" => Ok(Self::Updated),
            other => Err(UnknownChangeType(other.to_string())),
        }
    }
}

/// Fact that a store changed inside a write transaction
///
/// Carries identifiers only. The store state delivered to the legacy system is
/// always re-read at attempt time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Store identity
    pub store_id: i64,
    /// What happened to the store
    pub change_type: ChangeType,
    /// Store version observed by the writer, if versioned
    pub expected_version: Option<i64>,
    /// Opaque id tying log lines of one change together
    pub correlation_id: String,
}

impl ChangeEvent {
    /// Create an event with a fresh correlation id
    #[must_use]
    pub fn new(store_id: i64, change_type: ChangeType, expected_version: Option<i64>) -> Self {
        Self {
            store_id,
            change_type,
            expected_version,
            correlation_id: Uuid::new_v4().to_string(),
        }
    }
}
