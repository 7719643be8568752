//! Error types for the coordination layer
//!
//! Errors are cloneable and serializable so one failure can be multicast to
//! every subscriber of a watcher and forwarded to the presentation layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::UserId;

/// Failure reported by the backing query/storage engine
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum EngineError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Handle already disconnected")]
    Disconnected,

    #[error("{0}")]
    Other(String),
}

/// Error returned by every operation this crate exposes upward
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum MailboxError {
    /// No session for the identity. Not a fault: the mailbox is simply not
    /// authenticated, and callers usually render it as an empty listing.
    #[error("No active session for user: {0}")]
    SessionUnavailable(UserId),

    #[error("Engine fetch error: {0}")]
    EngineFetch(#[from] EngineError),

    #[error("Cache inconsistency: {0}")]
    CacheInconsistency(String),

    /// The handle was disconnected while the fetch was in flight; the result
    /// was discarded.
    #[error("Fetch cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl MailboxError {
    pub fn is_session_unavailable(&self) -> bool {
        matches!(self, Self::SessionUnavailable(_))
    }
}

impl From<std::io::Error> for MailboxError {
    fn from(err: std::io::Error) -> Self {
        MailboxError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for MailboxError {
    fn from(err: toml::de::Error) -> Self {
        MailboxError::Config(err.to_string())
    }
}

/// Result type alias using MailboxError
pub type Result<T> = std::result::Result<T, MailboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_converts_verbatim() {
        let err: MailboxError = EngineError::Network("timed out".to_string()).into();
        assert_eq!(
            err,
            MailboxError::EngineFetch(EngineError::Network("timed out".to_string()))
        );
        assert_eq!(err.to_string(), "Engine fetch error: Network error: timed out");
        assert!(!err.is_session_unavailable());
    }

    #[test]
    fn test_error_serializes_tagged() {
        let err = MailboxError::SessionUnavailable(UserId::new("alice"));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "SessionUnavailable");
        assert_eq!(json["message"], "alice");
        assert!(err.is_session_unavailable());
    }
}
