//! Error types for the pipeline
//!
//! [`ConfigError`] covers loading and validating configuration.
//! [`SyncError`] is what the entrypoints and the builder return; it wraps
//! the error of whichever component failed.

use odsync_events::EventError;
use odsync_graph::GraphError;
use odsync_model::StoreError;
use odsync_queue::QueueError;
use odsync_rdf::{TermError, TripleStoreError};
use odsync_search::SearchError;
use std::path::PathBuf;

/// Configuration failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for the schema
    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration could not be rendered
    #[error("cannot render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    /// Environment override has an unusable value
    #[error("invalid value {value:?} for {var}")]
    Env {
        /// Variable name
        var: &'static str,
        /// Value found
        value: String,
    },

    /// Values are inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Global subscriber could not be installed
    #[error("cannot initialise logging: {0}")]
    Logging(String),
}

/// Pipeline failures
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Bad configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Task could not be enqueued
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Strict dispatch failed
    #[error(transparent)]
    Event(#[from] EventError),

    /// Graph operation failed
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Search operation failed
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Triple store client failed
    #[error(transparent)]
    TripleStore(#[from] TripleStoreError),

    /// Malformed IRI
    #[error(transparent)]
    Term(#[from] TermError),

    /// Relational store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Snapshot or event log unreadable
    #[error("{}: {message}", path.display())]
    Input {
        /// File being read
        path: PathBuf,
        /// What went wrong
        message: String,
    },
}

impl SyncError {
    /// Another attempt may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Graph(e) => e.is_retryable(),
            Self::Search(e) => e.is_retryable(),
            Self::TripleStore(e) => e.is_retryable(),
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Remote side refused the connection
    #[must_use]
    pub fn is_connection_refused(&self) -> bool {
        match self {
            Self::Graph(e) => e.is_connection_refused(),
            Self::Search(e) => e.is_connection_refused(),
            Self::TripleStore(e) => e.is_connection_refused(),
            _ => false,
        }
    }

    pub(crate) fn input(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Input {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_their_class() {
        let refused = SyncError::from(SearchError::ConnectionRefused("localhost:9200".into()));
        assert!(refused.is_connection_refused());
        assert!(refused.is_retryable());

        let closed = SyncError::from(QueueError::Closed("odsync".into()));
        assert!(!closed.is_retryable());
        assert_eq!(closed.to_string(), "queue 'odsync' is closed");
    }

    #[test]
    fn env_error_names_the_variable() {
        let err = ConfigError::Env {
            var: "ODSYNC_WORKERS",
            value: "many".into(),
        };
        assert_eq!(err.to_string(), "invalid value \"many\" for ODSYNC_WORKERS");
    }
}
