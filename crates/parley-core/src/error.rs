//! Error types shared by the collaborator interfaces.
//!
//! Dispatch-level errors (language keys, authorization, handler faults) are
//! defined in `parley-framework`; this module only covers what a platform
//! client or a storage backend can report back.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors reported by a [`PlatformClient`](crate::PlatformClient).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The recipient never opened a chat with the bot or has blocked it.
    #[error("the recipient has either not yet started communication with this bot or blocked it")]
    RecipientUnreachable,

    /// The platform API rejected the request.
    #[error("API error ({code}): {description}")]
    Api {
        /// Platform specific error code.
        code: i64,
        /// Human readable description as returned by the platform.
        description: String,
    },

    /// The client has no live connection to the platform.
    #[error("client is not connected")]
    NotConnected,

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// Reading an upload from disk or writing to the socket failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Builds an API error, mapping the well-known "chat not found" response
    /// to [`TransportError::RecipientUnreachable`].
    pub fn api(code: i64, description: impl Into<String>) -> Self {
        let description = description.into();
        if description.contains("chat not found") {
            return Self::RecipientUnreachable;
        }
        Self::Api { code, description }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors reported by a [`SessionStore`](crate::SessionStore).
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// The stored document could not be (de)serialized.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// Backend specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for platform client calls.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_not_found_is_clarified() {
        let err = TransportError::api(400, "Bad Request: chat not found");
        assert!(matches!(err, TransportError::RecipientUnreachable));
        assert!(err.to_string().contains("blocked it"));
    }

    #[test]
    fn other_api_errors_keep_description() {
        let err = TransportError::api(429, "Too Many Requests");
        assert_eq!(err.to_string(), "API error (429): Too Many Requests");
    }
}
