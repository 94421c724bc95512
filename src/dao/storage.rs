use std::path::PathBuf;

use thiserror::Error;

/// Result alias for event storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by event sinks regardless of the underlying medium.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing file could not be opened or written.
    #[error("event log I/O failed for `{path}`")]
    Io {
        /// Location of the log.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// An event could not be encoded.
    #[error("failed to encode event")]
    Encode(#[from] serde_json::Error),
}

impl StorageError {
    /// Wrap an I/O failure with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}
