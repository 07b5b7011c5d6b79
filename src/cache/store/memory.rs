use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{BackendFuture, KvBackend};
use crate::config::DEFAULT_MEMORY_ENTRIES;

/// In-process backend with per-entry deadlines and an entry limit.
///
/// Past the limit the least recently used entry is evicted. Expired entries
/// read as absent; they are dropped on the next read of the key, or by any
/// write once they reach the cold end of the map.
pub struct MemoryBackend {
    entries: Mutex<LruCache<String, (Vec<u8>, Instant)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_capacity(NonZeroUsize::new(DEFAULT_MEMORY_ENTRIES).unwrap_or(NonZeroUsize::MIN))
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of entries held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("MemoryBackend")
            .field("len", &entries.len())
            .field("capacity", &entries.cap())
            .finish()
    }
}

impl KvBackend for MemoryBackend {
    fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if matches!(entries.peek(key), Some((_, deadline)) if *deadline <= now) {
            entries.pop(key);
        }
        let value = entries.get(key).map(|(value, _)| value.clone());
        drop(entries);
        Box::pin(std::future::ready(Ok(value)))
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> BackendFuture<'a, ()> {
        let now = Instant::now();
        let Some(deadline) = now.checked_add(ttl) else {
            debug!(key, ttl_secs = ttl.as_secs(), "ttl out of range, not stored");
            return Box::pin(std::future::ready(Ok(())));
        };

        let mut entries = self.entries.lock();
        while matches!(entries.peek_lru(), Some((_, (_, expiry))) if *expiry <= now) {
            entries.pop_lru();
        }
        entries.put(key.to_owned(), (value, deadline));
        drop(entries);
        Box::pin(std::future::ready(Ok(())))
    }

    fn delete<'a>(&'a self, key: &'a str) -> BackendFuture<'a, ()> {
        self.entries.lock().pop(key);
        Box::pin(std::future::ready(Ok(())))
    }
}
