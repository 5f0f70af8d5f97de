//! Storage-specific error type wrapping filesystem errors.

use std::path::PathBuf;

use linkbridge_domain::error::{BridgeError, ValidationError};

/// Errors originating from the filesystem command store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing a file failed.
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored signal file did not contain valid hex.
    #[error("corrupt signal file {}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },

    /// The blocking write task did not complete.
    #[error("write task failed")]
    Task(#[from] tokio::task::JoinError),
}

impl From<StoreError> for BridgeError {
    fn from(err: StoreError) -> Self {
        Self::Store(Box::new(err))
    }
}
