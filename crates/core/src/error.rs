//! Queue error model.

use thiserror::Error;

/// Result type used across the queue layers.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-level error.
///
/// An empty backlog or an elapsed blocking timeout is **not** an error; lease
/// operations report it as `Ok(None)`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Transient RPC/connection failure talking to the backing store.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The discovery service could not provide a primary endpoint.
    #[error("discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// The store answered but refused the command (bad argument, wrong
    /// type, script error). Retrying the same call cannot succeed.
    #[error("rejected by backend: {0}")]
    Rejected(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl QueueError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::DiscoveryUnavailable(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether a bounded retry may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_backend_failures_are_transient() {
        assert!(QueueError::backend("connection refused").is_transient());
        assert!(!QueueError::discovery("no primary").is_transient());
        assert!(!QueueError::config("empty queue name").is_transient());
        assert!(!QueueError::rejected("WRONGTYPE").is_transient());
    }

    #[test]
    fn display_includes_detail() {
        let err = QueueError::backend("broken pipe");
        assert_eq!(err.to_string(), "backend unavailable: broken pipe");
    }
}
