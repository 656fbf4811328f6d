use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;
use futures::future::{self, BoxFuture};

use super::{CacheResult, CacheStore};

/// Every this many writes the whole map is swept for expired entries.
const SWEEP_EVERY_WRITES: usize = 128;

/// Process-local cache backend.
///
/// Expired entries are evicted when read, and by a full sweep every
/// [`SWEEP_EVERY_WRITES`] writes so keys that are never read again do not pile up.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Entry>>,
    writes: Arc<AtomicUsize>,
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl MemoryCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry is held, expired ones included.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    fn read(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries
                .remove_if(key, |_, entry| entry.expires_at <= now);
        }
        None
    }
}

impl CacheStore for MemoryCache {
    fn get_string(&self, key: &str) -> BoxFuture<'static, CacheResult<Option<String>>> {
        Box::pin(future::ready(Ok(self.read(key))))
    }

    fn set_string(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'static, CacheResult<()>> {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY_WRITES == 0 {
            self.purge_expired();
        }
        let expires_at = Instant::now() + ttl;
        self.entries
            .insert(key.to_owned(), Entry { value, expires_at });
        Box::pin(future::ready(Ok(())))
    }

    fn delete(&self, keys: Vec<String>) -> BoxFuture<'static, CacheResult<()>> {
        for key in keys {
            self.entries.remove(&key);
        }
        Box::pin(future::ready(Ok(())))
    }
}
