//! Error types for RDF terms and triple store access

/// Invalid term construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TermError {
    /// IRI failed validation
    #[error("invalid IRI '{iri}': {reason}")]
    InvalidIri {
        /// Offending value
        iri: String,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Triple store request failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TripleStoreError {
    /// Endpoint refused the connection
    #[error("triple store refused connection: {0}")]
    ConnectionRefused(String),

    /// Request timed out
    #[error("triple store request timed out: {0}")]
    Timeout(String),

    /// Endpoint answered 5xx
    #[error("triple store server error {status}: {body}")]
    Server {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// Endpoint answered 4xx; the request itself is wrong
    #[error("triple store rejected request {status}: {body}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// Response could not be decoded
    #[error("invalid triple store response: {0}")]
    InvalidResponse(String),

    /// Other transport failure
    #[error("triple store transport error: {0}")]
    Transport(String),

    /// Client misconfiguration
    #[error("triple store configuration error: {0}")]
    Config(String),
}

impl TripleStoreError {
    /// Connection refused by the endpoint
    #[inline]
    #[must_use]
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused(_))
    }

    /// Transient; another attempt may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused(_) | Self::Timeout(_) | Self::Server { .. } | Self::Transport(_)
        )
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
