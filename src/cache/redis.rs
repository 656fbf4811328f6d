use std::time::Duration;

use futures::future::BoxFuture;
use redis::{AsyncCommands, Client, RedisError, aio::ConnectionManager};

use super::{CacheError, CacheResult, CacheStore};

/// Redis-backed cache sharing one auto-reconnecting connection manager.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    /// Open a client for `url` and establish the managed connection.
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = Client::open(url).map_err(backend_error("open client"))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(backend_error("connect"))?;
        Ok(Self { connection })
    }
}

fn backend_error(operation: &'static str) -> impl FnOnce(RedisError) -> CacheError {
    move |err| CacheError::backend(operation, err.to_string())
}

impl CacheStore for RedisCache {
    fn get_string(&self, key: &str) -> BoxFuture<'static, CacheResult<Option<String>>> {
        let mut connection = self.connection.clone();
        let key = key.to_owned();
        Box::pin(async move {
            connection
                .get::<_, Option<String>>(key)
                .await
                .map_err(backend_error("GET"))
        })
    }

    fn set_string(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'static, CacheResult<()>> {
        let mut connection = self.connection.clone();
        let key = key.to_owned();
        // SETEX rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);
        Box::pin(async move {
            connection
                .set_ex::<_, _, ()>(key, value, seconds)
                .await
                .map_err(backend_error("SETEX"))
        })
    }

    fn delete(&self, keys: Vec<String>) -> BoxFuture<'static, CacheResult<()>> {
        let mut connection = self.connection.clone();
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(());
            }
            connection
                .del::<_, ()>(keys)
                .await
                .map_err(backend_error("DEL"))
        })
    }
}
