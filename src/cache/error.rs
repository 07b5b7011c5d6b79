use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failures of the cache store and its backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend transport error: {0}")]
    Transport(#[from] redis::RedisError),

    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to encode cache entry: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode cache entry: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to initialize backend: {0}")]
    Init(String),
}

impl StoreError {
    /// `true` when the stored payload itself is bad rather than the backend.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

/// Everything that can go wrong while serving a request through the cache.
///
/// None of these abort request handling: lookup-path errors fall back to
/// forwarding upstream, store-path errors only skip storage.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read request body for the cache key: {0}")]
    KeyBuild(#[source] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to write cached response to the client: {0}")]
    ClientWrite(#[source] io::Error),
}

impl CacheError {
    /// Stable short name of the error kind, for log fields and alerts.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::KeyBuild(_) => "key_build",
            Self::Store(StoreError::Decode(_) | StoreError::Encode(_)) => "store_codec",
            Self::Store(_) => "store_transport",
            Self::ClientWrite(_) => "client_write",
        }
    }
}
