//! Request orchestrator.
//!
//! [`CacheEngine::serve`] runs one request through the cache:
//!
//! ```text
//! build key ──err──────────────────────────────▶ error: forward, done
//!     │
//! lookup ─────err──────────────────────────────▶ error: forward, done
//!     │
//!     ├── hit ──▶ replay headers, status, body ─▶ done (delete entry if the client write fails)
//!     │
//!     └── miss ─▶ forward through capture ──▶ cacheable? ──yes──▶ store
//!                                                  └──no───▶ done
//! ```
//!
//! No cache failure ever keeps the request from being served. Errors are
//! handed to the [`Reporter`] and the request falls back to the upstream.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use crate::config::{BackendConfig, CacheConfig};
use crate::http::{Headers, Request, ResponseWriter};

use super::alert::Reporter;
use super::capture::ResponseCapture;
use super::entry::CachedResponse;
use super::error::CacheError;
use super::key::{CacheKey, KeyBuilder};
use super::policy::{CachePolicy, Verdict};
use super::registry::BackendRegistry;
use super::store::CacheStore;

/// Response header carrying the cache disposition.
pub const CACHE_STATUS_HEADER: &str = "Cache-Status";

/// Response header with the lookup time and key, outside production only.
pub const CACHE_DEBUG_HEADER: &str = "X-Cache-Debug";

/// How a request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Error,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Future returned by [`Upstream::forward`].
pub type UpstreamFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Whatever produces the live response on a miss or a cache failure.
///
/// Implementations write the response into `writer` and handle their own
/// errors, typically by writing an error response.
pub trait Upstream: Send {
    fn forward<'a>(self, request: Request, writer: &'a mut dyn ResponseWriter) -> UpstreamFuture<'a>
    where
        Self: 'a;
}

/// The cache, configured once and shared by all requests.
pub struct CacheEngine {
    keys: KeyBuilder,
    policy: CachePolicy,
    backend: BackendConfig,
    registry: Arc<BackendRegistry>,
    reporter: Reporter,
    debug: bool,
}

impl CacheEngine {
    pub fn new(config: &CacheConfig, registry: Arc<BackendRegistry>) -> Self {
        Self {
            keys: KeyBuilder::new(&config.hash_key),
            policy: CachePolicy::new(&config.force_cache),
            backend: config.backend.clone(),
            registry,
            reporter: Reporter::from_config(config),
            debug: !config.is_production(),
        }
    }

    /// Replaces the reporter built from configuration.
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Serves `request` into `writer`, from the cache or from `upstream`.
    pub async fn serve<U: Upstream>(
        &self,
        request_id: &str,
        mut request: Request,
        writer: &mut dyn ResponseWriter,
        upstream: U,
    ) -> CacheStatus {
        let key = match self.keys.build(&mut request).await {
            Ok(key) => key,
            Err(err) => {
                self.reporter.report(request_id, None, &err);
                return bypass(request, writer, upstream).await;
            }
        };

        let store = match self.registry.store(&self.backend).await {
            Ok(store) => store,
            Err(err) => {
                self.reporter.report(request_id, Some(&key), &err.into());
                return bypass(request, writer, upstream).await;
            }
        };

        match store.get(key.as_str()).await {
            Ok(Some(entry)) => {
                self.replay(request_id, &store, &key, entry, writer).await;
                CacheStatus::Hit
            }
            Ok(None) => {
                self.fill(request_id, &store, &key, request, writer, upstream)
                    .await;
                CacheStatus::Miss
            }
            Err(err) => {
                self.reporter.report(request_id, Some(&key), &err.into());
                bypass(request, writer, upstream).await
            }
        }
    }

    async fn replay(
        &self,
        request_id: &str,
        store: &CacheStore,
        key: &CacheKey,
        entry: CachedResponse,
        writer: &mut dyn ResponseWriter,
    ) {
        let headers = writer.headers_mut();
        headers.append(entry.headers());
        headers.set(CACHE_STATUS_HEADER, CacheStatus::Hit.as_str());
        self.debug_header(headers, key);

        writer.write_status(entry.status());
        if let Err(err) = writer.write_body(entry.body()).await {
            if let Err(delete) = store.delete(key.as_str()).await {
                self.reporter.report(request_id, Some(key), &delete.into());
            }
            self.reporter
                .report(request_id, Some(key), &CacheError::ClientWrite(err));
        }
    }

    async fn fill<U: Upstream>(
        &self,
        request_id: &str,
        store: &CacheStore,
        key: &CacheKey,
        request: Request,
        writer: &mut dyn ResponseWriter,
        upstream: U,
    ) {
        let headers = writer.headers_mut();
        headers.set(CACHE_STATUS_HEADER, CacheStatus::Miss.as_str());
        self.debug_header(headers, key);

        let method = request.method().clone();
        let request_headers = request.headers().clone();

        let mut capture = ResponseCapture::new(writer);
        upstream.forward(request, &mut capture).await;
        if let Some(kind) = capture.failure() {
            self.reporter
                .report(request_id, Some(key), &CacheError::ClientWrite(kind.into()));
            return;
        }
        let (status, mut headers, body) = capture.finish();

        let verdict = self.policy.evaluate(
            &method,
            &request_headers,
            status,
            &headers,
            SystemTime::now(),
        );
        let expires_at = match verdict {
            Verdict::Cacheable(at) => at,
            Verdict::Uncacheable(reason) => {
                debug!(request_id, key = %key, %reason, "response not stored");
                return;
            }
        };

        headers.remove(CACHE_STATUS_HEADER);
        headers.remove(CACHE_DEBUG_HEADER);
        if varies_on_encoding(&headers) {
            headers.remove("Content-Encoding");
            headers.remove("Vary");
        }

        let entry = CachedResponse::new(status, headers, body);
        match store.set_expires(key.as_str(), expires_at, &entry).await {
            Ok(()) => debug!(request_id, key = %key, status = status.as_u16(), "response stored"),
            Err(err) => self.reporter.report(request_id, Some(key), &err.into()),
        }
    }

    fn debug_header(&self, headers: &mut Headers, key: &CacheKey) {
        if self.debug {
            let time = httpdate::fmt_http_date(SystemTime::now());
            headers.set(CACHE_DEBUG_HEADER, format!("time={time}; key={key}"));
        }
    }
}

async fn bypass<U: Upstream>(
    request: Request,
    writer: &mut dyn ResponseWriter,
    upstream: U,
) -> CacheStatus {
    writer
        .headers_mut()
        .set(CACHE_STATUS_HEADER, CacheStatus::Error.as_str());
    upstream.forward(request, writer).await;
    CacheStatus::Error
}

fn varies_on_encoding(headers: &Headers) -> bool {
    headers
        .get_all("Vary")
        .flat_map(|v| v.split(','))
        .any(|v| v.trim().eq_ignore_ascii_case("Accept-Encoding"))
}
