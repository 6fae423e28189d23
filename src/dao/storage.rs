use std::error::Error;
use thiserror::Error;

/// Result alias for record store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by record store backends regardless of the underlying database.
///
/// Callers on the mutation path only log these; the in-memory board stays authoritative.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or refused the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A stored record could not be decoded into its entity.
    #[error("corrupt record in `{collection}`: {message}")]
    Corrupt {
        collection: &'static str,
        message: String,
    },
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
