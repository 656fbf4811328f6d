mod config;
mod connection;
mod error;
mod models;
/// Collection access and the `DebateStore` implementation.
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoDebateStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::Duplicate { entity, key } => StorageError::Duplicate { entity, key },
            MongoDaoError::VersionConflict { room_id, expected } => {
                StorageError::VersionConflict { room_id, expected }
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
