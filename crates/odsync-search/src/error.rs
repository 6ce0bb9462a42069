//! Error types for the search side
//!
//! Index failures follow the same split as the triple store: refusals,
//! timeouts and 5xx answers are transient, 4xx answers and undecodable
//! responses are permanent.

use odsync_model::{EntityKind, StoreError};
use odsync_queue::TaskError;

/// Search index, document building and checker failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// Index refused the connection
    #[error("search index refused connection: {0}")]
    ConnectionRefused(String),

    /// Request timed out
    #[error("search index request timed out: {0}")]
    Timeout(String),

    /// Index answered 5xx
    #[error("search index server error {status}: {body}")]
    Server {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// Index answered 4xx
    #[error("search index rejected request {status}: {body}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// Some items of a bulk request failed
    #[error("{failed} bulk item(s) failed, first with status {status}: {reason}")]
    BulkItems {
        /// Number of failed items
        failed: usize,
        /// Status of the first failed item
        status: u16,
        /// Reason given for the first failed item
        reason: String,
    },

    /// Response could not be decoded
    #[error("invalid search index response: {0}")]
    InvalidResponse(String),

    /// Other transport failure
    #[error("search index transport error: {0}")]
    Transport(String),

    /// Client misconfiguration
    #[error("search index configuration error: {0}")]
    Config(String),

    /// No document mapping registered for the kind
    #[error("no document mapping registered for {0}")]
    UnmappedKind(EntityKind),

    /// Relational store failed
    #[error("entity store: {0}")]
    Store(#[from] StoreError),

    /// Checkpoint could not be read or written
    #[error("checkpoint: {0}")]
    Checkpoint(String),
}

impl SearchError {
    /// Connection refused by the index
    #[inline]
    #[must_use]
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused(_))
    }

    /// Transient; another attempt may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionRefused(_) | Self::Timeout(_) | Self::Server { .. } | Self::Transport(_) => {
                true
            }
            Self::BulkItems { status, .. } => *status == 429 || *status >= 500,
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Repeating the request cannot help
    #[inline]
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_connect() {
            Self::ConnectionRefused(err.to_string())
        } else if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            Self::Config(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }

    pub(crate) fn from_status(status: u16, body: String) -> Self {
        if status >= 500 {
            Self::Server { status, body }
        } else {
            Self::Rejected { status, body }
        }
    }
}

impl From<SearchError> for TaskError {
    fn from(err: SearchError) -> Self {
        let message = err.to_string();
        match err {
            SearchError::ConnectionRefused(_) => TaskError::ConnectionRefused(message),
            SearchError::Timeout(_) => TaskError::Timeout(message),
            SearchError::UnmappedKind(_) => TaskError::UnknownOperation(message),
            e if e.is_retryable() => TaskError::Unavailable(message),
            SearchError::Store(_) | SearchError::Checkpoint(_) => TaskError::Failed(message),
            _ => TaskError::InvalidData(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(SearchError::from_status(502, String::new()).is_retryable());
        assert!(SearchError::from_status(409, String::new()).is_permanent());
        assert!(SearchError::BulkItems {
            failed: 1,
            status: 429,
            reason: "es_rejected_execution_exception".into()
        }
        .is_retryable());
        assert!(SearchError::BulkItems {
            failed: 1,
            status: 400,
            reason: "mapper_parsing_exception".into()
        }
        .is_permanent());
    }

    #[test]
    fn task_error_classes() {
        let refused: TaskError = SearchError::ConnectionRefused("x".into()).into();
        assert!(refused.is_connection_refused());
        let server: TaskError = SearchError::from_status(503, String::new()).into();
        assert!(server.is_transient());
        let rejected: TaskError = SearchError::from_status(400, String::new()).into();
        assert!(rejected.is_permanent());
        let unmapped: TaskError = SearchError::UnmappedKind(EntityKind::Category).into();
        assert!(matches!(unmapped, TaskError::UnknownOperation(_)));
    }
}
