//! Error types for the task queue
//!
//! [`TaskError`] is what a unit of work reports back to the worker. Its
//! variants follow the failure taxonomy the retry logic acts on:
//! - transient infrastructure errors (may be retried)
//! - data errors (never retried)
//! - unrecognized operations (never retried, logged loudly)

use serde::{Deserialize, Serialize};

/// Failure reported by a task executor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// Remote service refused the connection
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// Remote service did not answer in time
    #[error("timed out: {0}")]
    Timeout(String),

    /// Remote service answered with a server-side failure
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The entity the task refers to no longer exists
    #[error("entity no longer exists: {0}")]
    EntityVanished(String),

    /// Entity data cannot be projected (missing field, malformed URI)
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The executor does not know how to run this task
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Unclassified failure
    #[error("task failed: {0}")]
    Failed(String),
}

impl TaskError {
    /// Connection refused by the remote side
    #[inline]
    #[must_use]
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused(_))
    }

    /// Transient infrastructure error
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused(_) | Self::Timeout(_) | Self::Unavailable(_)
        )
    }

    /// Never retried, whatever the policy says
    #[inline]
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::EntityVanished(_) | Self::InvalidData(_) | Self::UnknownOperation(_)
        )
    }

    /// Short machine-readable class, used as a metrics label
    #[inline]
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Self::ConnectionRefused(_) => "connection_refused",
            Self::Timeout(_) => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::EntityVanished(_) => "entity_vanished",
            Self::InvalidData(_) => "invalid_data",
            Self::UnknownOperation(_) => "unknown_operation",
            Self::Failed(_) => "failed",
        }
    }
}

/// Why a task ended up permanently failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Error class is never retried
    Permanent,
    /// Retry predicate rejected the error
    NotRetryable,
    /// `max_retries` reached
    RetriesExhausted,
    /// Queue shut down while a retry was pending
    Shutdown,
}

impl FailureReason {
    /// Metrics label
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::NotRetryable => "not_retryable",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Queue-level errors returned to the enqueuing caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Queue no longer accepts tasks
    #[error("queue '{0}' is closed")]
    Closed(String),

    /// Invalid configuration
    #[error("invalid queue configuration: {0}")]
    InvalidConfig(String),
}
