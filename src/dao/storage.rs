use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
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

/// Outcome of a conditional write.
///
/// A failed condition is an expected outcome under concurrency, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conditional<T> {
    /// The write happened; carries the record as stored.
    Applied(T),
    /// The stored record did not match the expected state; nothing was written.
    ConditionFailed,
}

impl<T> Conditional<T> {
    /// Whether the write happened.
    pub fn is_applied(&self) -> bool {
        matches!(self, Conditional::Applied(_))
    }

    /// Convert into an option holding the stored record.
    pub fn applied(self) -> Option<T> {
        match self {
            Conditional::Applied(value) => Some(value),
            Conditional::ConditionFailed => None,
        }
    }
}
