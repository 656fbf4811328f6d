//! Key-value accelerator sitting in front of the durable store.
//!
//! Nothing stored here is authoritative. Backends may lose entries at any time and every
//! failure is downgraded to a miss by [`RoomCache`].

/// In-process TTL map.
pub mod memory;
/// Backend that never stores anything.
pub mod noop;
/// Redis backend.
#[cfg(feature = "redis-cache")]
pub mod redis;
mod room_cache;
#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;

pub use memory::MemoryCache;
pub use noop::NoopCache;
pub use room_cache::{RoomCache, ScoreMap, StatusSnapshot};

/// Result alias for cache backend operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Failures reported by cache backends or while decoding cached values.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend failed or could not be reached.
    #[error("cache backend failure during {operation}: {message}")]
    Backend {
        /// Backend call that failed.
        operation: &'static str,
        /// Backend error rendered as text.
        message: String,
    },
    /// A stored value is not valid JSON for the expected type.
    #[error("cached value under `{key}` could not be decoded")]
    Codec {
        /// Key of the undecodable entry.
        key: String,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    /// Backend failure of `operation`.
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        CacheError::Backend {
            operation,
            message: message.into(),
        }
    }
}

/// String key-value store with per-key expiry.
pub trait CacheStore: Send + Sync {
    /// Value stored under `key`, or `None` when absent or expired.
    fn get_string(&self, key: &str) -> BoxFuture<'static, CacheResult<Option<String>>>;
    /// Store `value` under `key`, replacing any previous value, for at most `ttl`.
    fn set_string(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'static, CacheResult<()>>;
    /// Remove every listed key; missing keys are ignored.
    fn delete(&self, keys: Vec<String>) -> BoxFuture<'static, CacheResult<()>>;
}
