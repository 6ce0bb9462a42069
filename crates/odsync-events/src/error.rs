//! Error types for the event bus

/// Error raised by a handler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    /// Human-readable cause
    pub message: String,
}

impl HandlerError {
    /// Create handler error
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Event bus errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// A handler failed during strict dispatch
    #[error("handler '{handler}' failed: {source}")]
    HandlerFailed {
        /// Name of the failing handler
        handler: String,
        /// The handler's error
        #[source]
        source: HandlerError,
    },

    /// Operation name not recognized
    #[error("unknown operation: '{0}'")]
    UnknownOperation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_failed_display() {
        let err = EventError::HandlerFailed {
            handler: "graph".to_string(),
            source: HandlerError::new("boom"),
        };
        assert_eq!(err.to_string(), "handler 'graph' failed: boom");
    }
}
