//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use parley_core::{StorageError, TransportError};

/// Errors that stop the runtime.
///
/// Failures while handling single updates never end up here; the dispatcher
/// contains them.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The configuration or the language file could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The platform client could not open the update stream.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The session store could not be set up.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A framework failure outside of update handling.
    #[error("Framework error: {0}")]
    Framework(#[from] parley_framework::Error),
}

impl RuntimeError {
    /// The process exit code for this error.
    ///
    /// Configuration problems exit with `2`, everything else with `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn configuration_errors_have_their_own_exit_code() {
        let err = RuntimeError::from(ConfigError::FileNotFound(PathBuf::from("config/lang.toml")));
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("config/lang.toml"));

        let err = RuntimeError::from(TransportError::NotConnected);
        assert_eq!(err.exit_code(), 1);
    }
}
