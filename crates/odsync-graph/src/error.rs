//! Error types for graph operations
//!
//! [`GraphError`] converts into the queue's [`TaskError`] so the retry policy
//! sees the right class:
//! - triple store connection refusal and timeouts stay transient
//! - mapping failures and vanished entities become permanent data errors
//! - kinds without a registered mapping become unknown operations

use odsync_model::{EntityKind, EntityRef, StoreError};
use odsync_queue::TaskError;
use odsync_rdf::{TermError, TripleStoreError};

/// An entity cannot be projected into triples
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// Required field empty or absent
    #[error("{entity}: required field '{field}' is missing")]
    MissingField {
        /// Entity being mapped
        entity: EntityRef,
        /// Field name
        field: &'static str,
    },

    /// Field value is not a valid IRI
    #[error("{entity}: field '{field}' is not a valid IRI: {source}")]
    InvalidIri {
        /// Entity being mapped
        entity: EntityRef,
        /// Field name
        field: &'static str,
        /// Validation failure
        #[source]
        source: TermError,
    },

    /// Mapping handed an entity of another kind
    #[error("mapping for {expected} received {found}")]
    KindMismatch {
        /// Kind the mapping handles
        expected: EntityKind,
        /// Kind it received
        found: EntityKind,
    },
}

/// Graph operation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// No mapping registered for the kind
    #[error("no graph mapping registered for {0}")]
    UnmappedKind(EntityKind),

    /// Entity needed for the operation no longer exists
    #[error("entity {0} no longer exists")]
    EntityVanished(EntityRef),

    /// Projection failed
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Relational store failed
    #[error("entity store: {0}")]
    Store(#[from] StoreError),

    /// Triple store failed
    #[error(transparent)]
    TripleStore(#[from] TripleStoreError),

    /// Unparseable operation name
    #[error("unknown graph operation '{0}'")]
    UnknownOperation(String),
}

impl GraphError {
    /// Connection refused by the triple store
    #[inline]
    #[must_use]
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::TripleStore(e) if e.is_connection_refused())
    }

    /// Another attempt may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TripleStore(e) => e.is_retryable(),
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<GraphError> for TaskError {
    fn from(err: GraphError) -> Self {
        let message = err.to_string();
        match err {
            GraphError::UnmappedKind(_) | GraphError::UnknownOperation(_) => {
                TaskError::UnknownOperation(message)
            }
            GraphError::EntityVanished(_) => TaskError::EntityVanished(message),
            GraphError::Mapping(_) => TaskError::InvalidData(message),
            GraphError::Store(StoreError::Unavailable(_)) => TaskError::Unavailable(message),
            GraphError::Store(StoreError::Query(_)) => TaskError::Failed(message),
            GraphError::TripleStore(e) => match e {
                TripleStoreError::ConnectionRefused(_) => TaskError::ConnectionRefused(message),
                TripleStoreError::Timeout(_) => TaskError::Timeout(message),
                TripleStoreError::Server { .. } | TripleStoreError::Transport(_) => {
                    TaskError::Unavailable(message)
                }
                TripleStoreError::Rejected { .. }
                | TripleStoreError::InvalidResponse(_)
                | TripleStoreError::Config(_) => TaskError::InvalidData(message),
            },
        }
    }
}
