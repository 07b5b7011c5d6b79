//! HTTP response caching.
//!
//! The pieces, from the bottom up:
//!
//! - [`hash`]: stable digests for keys.
//! - [`key`]: [`KeyBuilder`] turns a request into a [`CacheKey`].
//! - [`entry`]: [`CachedResponse`], the stored form of a response.
//! - [`store`]: [`CacheStore`] over a memory or Redis [`KvBackend`].
//! - [`policy`]: whether and until when a response may be stored.
//! - [`capture`]: [`ResponseCapture`], which records a response as it is sent.
//! - [`registry`]: [`BackendRegistry`], one store per backend configuration.
//! - [`alert`]: error log plus optional Telegram alerts.
//! - [`engine`]: [`CacheEngine`], the per-request hit/miss/error flow.
//! - [`layer`]: [`CacheMiddleware`], the engine as an rttp middleware.

pub mod alert;
pub mod capture;
pub mod engine;
pub mod entry;
pub mod error;
pub mod hash;
pub mod key;
pub mod layer;
pub mod policy;
pub mod registry;
pub mod store;

pub use alert::{AlertSink, Reporter, TelegramAlert};
pub use capture::ResponseCapture;
pub use engine::{CACHE_DEBUG_HEADER, CACHE_STATUS_HEADER, CacheEngine, CacheStatus, Upstream, UpstreamFuture};
pub use entry::CachedResponse;
pub use error::{CacheError, StoreError};
pub use key::{CacheKey, KeyBuilder};
pub use layer::CacheMiddleware;
pub use policy::{CachePolicy, ForceCache, Verdict};
pub use registry::BackendRegistry;
pub use store::{CacheStore, KvBackend, MemoryBackend, RedisBackend};
