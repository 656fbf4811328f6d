use std::time::Duration;

use futures::future::{self, BoxFuture};

use super::{CacheError, CacheResult, CacheStore};

/// Backend whose every operation fails, simulating an unreachable cache server.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingCache;

impl CacheStore for FailingCache {
    fn get_string(&self, _key: &str) -> BoxFuture<'static, CacheResult<Option<String>>> {
        Box::pin(future::ready(Err(CacheError::backend("get", "connection refused"))))
    }

    fn set_string(
        &self,
        _key: &str,
        _value: String,
        _ttl: Duration,
    ) -> BoxFuture<'static, CacheResult<()>> {
        Box::pin(future::ready(Err(CacheError::backend("set", "connection refused"))))
    }

    fn delete(&self, _keys: Vec<String>) -> BoxFuture<'static, CacheResult<()>> {
        Box::pin(future::ready(Err(CacheError::backend("delete", "connection refused"))))
    }
}
