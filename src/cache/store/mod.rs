//! Cache store: TTL-aware persistence of [`CachedResponse`]s.
//!
//! [`CacheStore`] owns encoding and expiry arithmetic; the byte-level work is
//! delegated to a [`KvBackend`], of which there are two:
//!
//! - [`MemoryBackend`]: in-process map, for single-node deployments and tests.
//! - [`RedisBackend`]: shared Redis instance.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::debug;

use super::entry::CachedResponse;
use super::error::StoreError;

mod memory;
mod redis_backend;

pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;

/// Future returned by [`KvBackend`] operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// A TTL-capable key/value service.
///
/// Implementations must be safe for unbounded concurrent callers.
pub trait KvBackend: Send + Sync {
    /// Returns the stored bytes, or `None` on a miss.
    fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<Vec<u8>>>;

    /// Stores `value` under `key` for `ttl` (whole seconds, at least one).
    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> BackendFuture<'a, ()>;

    /// Removes `key`. Removing an absent key succeeds.
    fn delete<'a>(&'a self, key: &'a str) -> BackendFuture<'a, ()>;
}

/// Typed front of a [`KvBackend`].
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn KvBackend>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// A store over a fresh [`MemoryBackend`].
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Looks up `key`.
    ///
    /// An absent or empty value is a miss (`Ok(None)`). A payload that cannot
    /// be decoded is a [`StoreError::Decode`].
    pub async fn get(&self, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        match self.backend.get(key).await? {
            Some(raw) if !raw.is_empty() => CachedResponse::decode(&raw).map(Some),
            _ => Ok(None),
        }
    }

    /// Stores `entry` until `expires_at`.
    ///
    /// Does nothing when less than a whole second remains, so an already
    /// expired entry is never written.
    pub async fn set_expires(
        &self,
        key: &str,
        expires_at: SystemTime,
        entry: &CachedResponse,
    ) -> Result<(), StoreError> {
        let raw = entry.encode()?;

        let Some(ttl) = remaining_ttl(expires_at, SystemTime::now()) else {
            debug!(key, "entry already expired, not stored");
            return Ok(());
        };

        self.backend.set(key, raw, ttl).await
    }

    /// Removes `key`; absent keys are not an error.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.backend.delete(key).await
    }
}

/// Whole seconds between `now` and `expires_at`, or `None` if fewer than one.
fn remaining_ttl(expires_at: SystemTime, now: SystemTime) -> Option<Duration> {
    let secs = expires_at.duration_since(now).ok()?.as_secs();
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Headers, StatusCode};

    fn entry(body: &str) -> CachedResponse {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/plain");
        CachedResponse::new(StatusCode::OK, headers, body.as_bytes().to_vec())
    }

    fn in_a_minute() -> SystemTime {
        SystemTime::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn round_trip() {
        let store = CacheStore::memory();
        let stored = entry("hello");
        store.set_expires("k", in_a_minute(), &stored).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn miss_is_not_an_error() {
        let store = CacheStore::memory();
        assert_eq!(store.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_deadline_is_a_no_op() {
        let store = CacheStore::memory();
        let now = SystemTime::now();
        store.set_expires("past", now - Duration::from_secs(1), &entry("x")).await.unwrap();
        store.set_expires("now", now, &entry("x")).await.unwrap();
        assert_eq!(store.get("past").await.unwrap(), None);
        assert_eq!(store.get("now").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = CacheStore::memory();
        store.set_expires("k", in_a_minute(), &entry("x")).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("never-set").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_decode_error() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set("k", b"{oops".to_vec(), Duration::from_secs(60)).await.unwrap();
        let store = CacheStore::new(backend);
        assert!(store.get("k").await.unwrap_err().is_decode());
    }

    #[tokio::test]
    async fn empty_value_reads_as_miss() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set("k", Vec::new(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(CacheStore::new(backend).get("k").await.unwrap(), None);
    }

    #[test]
    fn ttl_rounds_down_to_seconds() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        assert_eq!(remaining_ttl(now + Duration::from_millis(1_999), now), Some(Duration::from_secs(1)));
        assert_eq!(remaining_ttl(now + Duration::from_millis(999), now), None);
        assert_eq!(remaining_ttl(now - Duration::from_secs(5), now), None);
    }
}
