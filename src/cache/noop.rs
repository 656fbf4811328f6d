use std::time::Duration;

use futures::future::{self, BoxFuture};

use super::{CacheResult, CacheStore};

/// Backend that stores nothing: every read misses and every write succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl CacheStore for NoopCache {
    fn get_string(&self, _key: &str) -> BoxFuture<'static, CacheResult<Option<String>>> {
        Box::pin(future::ready(Ok(None)))
    }

    fn set_string(
        &self,
        _key: &str,
        _value: String,
        _ttl: Duration,
    ) -> BoxFuture<'static, CacheResult<()>> {
        Box::pin(future::ready(Ok(())))
    }

    fn delete(&self, _keys: Vec<String>) -> BoxFuture<'static, CacheResult<()>> {
        Box::pin(future::ready(Ok(())))
    }
}
