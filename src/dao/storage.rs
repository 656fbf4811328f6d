use std::error::Error;
use thiserror::Error;

use crate::dao::models::RoomId;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend failed or could not be reached.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Context of the failure.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The room was modified by another operation since it was loaded.
    #[error("room `{room_id}` was modified concurrently (expected version {expected})")]
    VersionConflict {
        /// Room being saved.
        room_id: RoomId,
        /// Version the caller loaded.
        expected: u64,
    },
    /// A uniqueness constraint rejected the write.
    #[error("duplicate {entity}: {key}")]
    Duplicate {
        /// Kind of record.
        entity: &'static str,
        /// Conflicting key.
        key: String,
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

    /// Construct a duplicate-key error for the given entity kind.
    pub fn duplicate(entity: &'static str, key: impl Into<String>) -> Self {
        StorageError::Duplicate {
            entity,
            key: key.into(),
        }
    }
}
