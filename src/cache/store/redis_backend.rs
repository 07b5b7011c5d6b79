use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, IntoConnectionInfo, RedisResult};
use tracing::info;

use super::{BackendFuture, KvBackend};
use crate::cache::error::StoreError;
use crate::config::BackendConfig;

/// Redis-backed store.
///
/// Holds `maxIdleConnection` multiplexed connections, handed out round-robin.
/// Each one reconnects on its own after a failure. Every command is bounded by
/// the configured timeout.
pub struct RedisBackend {
    connections: Vec<ConnectionManager>,
    next: AtomicUsize,
    timeout: Duration,
}

impl RedisBackend {
    /// Opens the configured number of connections.
    ///
    /// # Errors
    ///
    /// [`StoreError::Transport`] for a bad address or refused connection,
    /// [`StoreError::Timeout`] if the server does not answer in time.
    pub async fn connect(config: &BackendConfig) -> Result<Self, StoreError> {
        let address = if config.address.contains("://") {
            config.address.clone()
        } else {
            format!("redis://{}", config.address)
        };

        let mut info = address.as_str().into_connection_info()?;
        if config.username.is_some() {
            info.redis.username = config.username.clone();
        }
        if config.password.is_some() {
            info.redis.password = config.password.clone();
        }
        let client = Client::open(info)?;

        let timeout = config.call_timeout();
        let count = config.connections();
        let mut connections = Vec::with_capacity(count);
        for _ in 0..count {
            let manager = tokio::time::timeout(timeout, ConnectionManager::new(client.clone()))
                .await
                .map_err(|_| StoreError::Timeout(timeout))??;
            connections.push(manager);
        }

        info!(address = %config.address, connections = count, ?timeout, "redis backend connected");

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
            timeout,
        })
    }

    fn connection(&self) -> ConnectionManager {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[index].clone()
    }

    async fn bounded<T>(&self, op: impl Future<Output = RedisResult<T>>) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
            .map_err(StoreError::from)
    }
}

impl KvBackend for RedisBackend {
    fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            let mut conn = self.connection();
            self.bounded(conn.get::<_, Option<Vec<u8>>>(key)).await
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.connection();
            self.bounded(conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()))
                .await
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.connection();
            let _removed: i64 = self.bounded(conn.del(key)).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;

    #[tokio::test]
    async fn malformed_address_is_a_transport_error() {
        let config = BackendConfig {
            kind: BackendKind::Redis,
            address: "unix-ish://nowhere".into(),
            ..BackendConfig::default()
        };
        let err = RedisBackend::connect(&config).await.err().unwrap();
        assert!(matches!(err, StoreError::Transport(_)));
    }
}
