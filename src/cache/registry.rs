//! Backend initializer.
//!
//! One [`CacheStore`] per distinct [`BackendConfig`], shared by every cache
//! middleware built from the same registry. Each configuration owns a one-shot
//! cell, so its backend is constructed once even when many requests race on
//! first use. A failed construction leaves the cell empty and the next caller
//! tries again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::{BackendConfig, BackendKind};

use super::error::StoreError;
use super::store::{CacheStore, MemoryBackend, RedisBackend};

type Slot = Arc<OnceCell<CacheStore>>;

/// Registry of lazily-constructed stores, keyed by canonical configuration.
#[derive(Default)]
pub struct BackendRegistry {
    slots: RwLock<HashMap<String, Slot>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the store for `config`, connecting on first use.
    pub async fn store(&self, config: &BackendConfig) -> Result<CacheStore, StoreError> {
        self.get_or_try_init_with(config, open_backend).await
    }

    /// Like [`store`](Self::store) with a caller-supplied constructor.
    ///
    /// `init` runs at most once per configuration until it succeeds.
    pub async fn get_or_try_init_with<F, Fut>(
        &self,
        config: &BackendConfig,
        init: F,
    ) -> Result<CacheStore, StoreError>
    where
        F: FnOnce(BackendConfig) -> Fut,
        Fut: Future<Output = Result<CacheStore, StoreError>>,
    {
        let slot = self.slot(config.canonical());
        slot.get_or_try_init(|| init(config.clone())).await.cloned()
    }

    /// Number of distinct configurations seen.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, canonical: String) -> Slot {
        if let Some(slot) = self.slots.read().get(&canonical) {
            return Arc::clone(slot);
        }
        Arc::clone(self.slots.write().entry(canonical).or_default())
    }
}

async fn open_backend(config: BackendConfig) -> Result<CacheStore, StoreError> {
    let store = match config.kind {
        BackendKind::Memory => CacheStore::new(Arc::new(MemoryBackend::with_capacity(config.memory_capacity()))),
        BackendKind::Redis => CacheStore::new(Arc::new(RedisBackend::connect(&config).await?)),
    };
    info!(kind = ?config.kind, "cache backend initialized");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::cache::entry::CachedResponse;
    use crate::http::{Headers, StatusCode};

    #[tokio::test]
    async fn same_config_shares_one_store() {
        let registry = BackendRegistry::new();
        let a = registry.store(&BackendConfig::memory()).await.unwrap();
        let b = registry.store(&BackendConfig::memory()).await.unwrap();

        let entry = CachedResponse::new(StatusCode::OK, Headers::new(), b"x".to_vec());
        a.set_expires("k", SystemTime::now() + Duration::from_secs(60), &entry)
            .await
            .unwrap();
        assert_eq!(b.get("k").await.unwrap(), Some(entry));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn distinct_configs_get_distinct_stores() {
        let registry = BackendRegistry::new();
        let one = BackendConfig::memory();
        let two = BackendConfig {
            timeout: Some(5),
            ..BackendConfig::memory()
        };

        let a = registry.store(&one).await.unwrap();
        let b = registry.store(&two).await.unwrap();
        let entry = CachedResponse::new(StatusCode::OK, Headers::new(), Vec::new());
        a.set_expires("k", SystemTime::now() + Duration::from_secs(60), &entry)
            .await
            .unwrap();

        assert_eq!(b.get("k").await.unwrap(), None);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_first_use_initializes_once() {
        let registry = Arc::new(BackendRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    registry
                        .get_or_try_init_with(&BackendConfig::memory(), |_| async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(CacheStore::memory())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_init_is_retried() {
        let registry = BackendRegistry::new();
        let config = BackendConfig::memory();

        let failed = registry
            .get_or_try_init_with(&config, |_| async { Err(StoreError::Init("down".into())) })
            .await;
        assert!(matches!(failed, Err(StoreError::Init(_))));

        let recovered = registry
            .get_or_try_init_with(&config, |_| async { Ok(CacheStore::memory()) })
            .await;
        assert!(recovered.is_ok());
    }
}
