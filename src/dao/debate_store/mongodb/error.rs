use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;

use crate::dao::models::RoomId;

/// Convenient result alias returning [`MongoDaoError`] failures.
pub type MongoResult<T> = Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Failures that can occur while interacting with MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// A required environment variable is not set.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// The connection URI could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Rejected URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The driver rejected the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered a ping while connecting.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings sent before giving up.
        attempts: u32,
        /// Error of the last ping.
        #[source]
        source: MongoError,
    },
    /// A health check ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// An index could not be created.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Indexed collection.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A read or write failed.
    #[error("failed to {operation} in collection `{collection}`")]
    Query {
        /// What was being done.
        operation: &'static str,
        /// Target collection.
        collection: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A `counters` document returned no value.
    #[error("sequence `{name}` could not be advanced")]
    Sequence {
        /// Counter name.
        name: &'static str,
    },
    /// A unique index rejected the write.
    #[error("duplicate {entity}: {key}")]
    Duplicate {
        /// Kind of record.
        entity: &'static str,
        /// Conflicting key.
        key: String,
    },
    /// The room's stored version no longer matches.
    #[error("room `{room_id}` was modified concurrently (expected version {expected})")]
    VersionConflict {
        /// Room being saved.
        room_id: RoomId,
        /// Version the caller loaded.
        expected: u64,
    },
}

impl MongoDaoError {
    pub(super) fn query(
        operation: &'static str,
        collection: &'static str,
    ) -> impl FnOnce(MongoError) -> Self {
        move |source| MongoDaoError::Query {
            operation,
            collection,
            source,
        }
    }
}

/// Whether the server rejected a write because of a unique index.
pub(super) fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}
