use std::error::Error;
use thiserror::Error;

/// Result alias for local storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by local storage backends regardless of where bytes end up.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("failed to encode value for key `{key}`")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored value under `{key}` is corrupted")]
    Corrupted {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid storage key `{key}`: {reason}")]
    InvalidKey { key: String, reason: &'static str },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
