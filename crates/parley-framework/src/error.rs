//! Error types for the parley framework.
//!
//! Every failure that can happen while handling one update is an [`Error`].
//! The dispatcher contains all of them at the update boundary: nothing here
//! ever terminates the process or leaks into another session.

use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error;
use tower::BoxError;

use parley_core::{StorageError, TransportError};

/// Returned by an update filter when an update must be dropped.
///
/// The dispatcher service recognises this error and silently skips the
/// update without logging anything. All other errors are genuine failures.
#[derive(Debug, Clone, Error)]
#[error("update skipped by filter")]
pub struct UpdateSkipped;

/// Returned to a suspended conversation when the user cancelled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("conversation cancelled")]
pub struct ConversationCancelled;

/// The failure taxonomy of a handled update.
#[derive(Debug, Error)]
pub enum Error {
    /// A language key is missing from both the user's and the default segment.
    #[error("language key '{key}' not found (locale '{locale}')")]
    MissingLanguageKey { locale: String, key: String },

    /// Positional formatting failed.
    #[error("cannot format '{template}': {reason}")]
    Format { template: String, reason: String },

    /// The user lacks the access level a handler requires.
    #[error("insufficient access permissions")]
    AuthorizationDenied,

    /// A media answer references a file that does not exist.
    #[error("the file \"{}\" could not be found", path.display())]
    MediaNotFound { path: PathBuf },

    /// The platform client failed to send or edit.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Loading or flushing the session storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A route argument is missing or cannot be parsed.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// An answer has no recipient (e.g. a startup answer without a receiver).
    #[error("answer has no recipient")]
    MissingRecipient,

    /// Any other failure raised by handler code.
    #[error("{message}")]
    HandlerFault {
        message: String,
        location: Option<&'static Location<'static>>,
    },
}

impl Error {
    /// Creates a handler fault that remembers the caller's file and line.
    #[track_caller]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::HandlerFault {
            message: message.into(),
            location: Some(Location::caller()),
        }
    }

    /// Recovers an [`Error`] from a type-erased error.
    ///
    /// Errors that already are an [`Error`] (or a transport / storage error)
    /// keep their category; anything else becomes a [`Error::HandlerFault`].
    pub fn from_boxed(err: BoxError) -> Self {
        let err = match err.downcast::<Error>() {
            Ok(err) => return *err,
            Err(err) => err,
        };
        let err = match err.downcast::<TransportError>() {
            Ok(err) => return Self::Transport(*err),
            Err(err) => err,
        };
        Self::HandlerFault {
            message: err.to_string(),
            location: None,
        }
    }

    /// Returns `true` if this failure should trigger the authorization reply
    /// rather than the generic error reply.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::AuthorizationDenied)
    }
}

/// Result type for framework operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_records_location() {
        let err = Error::fault("boom");
        match err {
            Error::HandlerFault { location, .. } => {
                let location = location.unwrap();
                assert!(location.file().ends_with("error.rs"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn boxed_framework_errors_keep_their_category() {
        let boxed: BoxError = Box::new(Error::AuthorizationDenied);
        assert!(Error::from_boxed(boxed).is_authorization());

        let boxed: BoxError = Box::new(TransportError::RecipientUnreachable);
        assert!(matches!(Error::from_boxed(boxed), Error::Transport(_)));
    }

    #[test]
    fn foreign_errors_become_faults() {
        let boxed: BoxError = "plain failure".into();
        match Error::from_boxed(boxed) {
            Error::HandlerFault { message, location } => {
                assert_eq!(message, "plain failure");
                assert!(location.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
