//! The cache as an rttp [`Middleware`].

use std::sync::Arc;

use tracing::warn;

use crate::context::{Context, Extensions};
use crate::http::{Request, Response, ResponseWriter, StatusCode};
use crate::middleware::{BoxResponseFuture, Middleware, Next, RequestId};

use super::alert::Reporter;
use super::engine::{CacheEngine, Upstream, UpstreamFuture};
use super::registry::BackendRegistry;
use crate::config::CacheConfig;

/// Caching middleware.
///
/// The rest of the chain acts as the upstream: on a miss or a cache failure
/// the request continues down the chain, and what comes back is written to
/// the client through the cache. Hits never reach the inner layers.
///
/// Instances built from the same [`BackendRegistry`] with equal backend
/// settings share one store.
///
/// The engine writes into a buffered [`Response`] that the server sends once
/// the chain returns, so writes seen here never fail. A socket error while
/// sending a hit therefore leaves the entry in place; eviction on a failed
/// client write applies to callers that drive [`CacheEngine::serve`] with a
/// streaming [`ResponseWriter`].
pub struct CacheMiddleware {
    engine: Arc<CacheEngine>,
}

impl CacheMiddleware {
    pub fn new(config: &CacheConfig, registry: Arc<BackendRegistry>) -> Self {
        Self {
            engine: Arc::new(CacheEngine::new(config, registry)),
        }
    }

    /// Replaces the reporter built from configuration.
    pub fn with_reporter(config: &CacheConfig, registry: Arc<BackendRegistry>, reporter: Reporter) -> Self {
        Self {
            engine: Arc::new(CacheEngine::new(config, registry).with_reporter(reporter)),
        }
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponseFuture {
        let engine = Arc::clone(&self.engine);
        Box::pin(async move {
            let (request, extensions) = ctx.into_parts();
            let request_id = match extensions.get::<RequestId>() {
                Some(id) => id.clone(),
                None => RequestId::from_request(&request),
            };

            let mut response = Response::new(StatusCode::OK);
            let upstream = NextUpstream { next, extensions };
            engine
                .serve(request_id.as_str(), request, &mut response, upstream)
                .await;
            response
        })
    }
}

/// Continues the middleware chain and copies its response into the writer.
struct NextUpstream {
    next: Next,
    extensions: Extensions,
}

impl Upstream for NextUpstream {
    fn forward<'a>(self, request: Request, writer: &'a mut dyn ResponseWriter) -> UpstreamFuture<'a>
    where
        Self: 'a,
    {
        Box::pin(async move {
            let response = self
                .next
                .run(Context::from_parts(request, self.extensions))
                .await;
            let (status, headers, body) = response.into_parts();

            writer.headers_mut().append(&headers);
            writer.write_status(status);
            if !body.is_empty() {
                if let Err(err) = writer.write_body(&body).await {
                    warn!(error = %err, "failed to write upstream body");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::Method;
    use crate::cache::CACHE_STATUS_HEADER;
    use crate::config::BackendConfig;
    use crate::middleware::{from_handler, from_middleware};

    #[tokio::test]
    async fn inner_layers_run_only_on_miss() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let config = CacheConfig {
            backend: BackendConfig::memory(),
            ..CacheConfig::default()
        };
        let cache = CacheMiddleware::new(&config, Arc::new(BackendRegistry::new()));
        let chain: Arc<[_]> = vec![
            from_middleware(Arc::new(cache)),
            from_handler(move |ctx: Context| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(ctx.request().path(), "/a");
                    Response::new(StatusCode::CREATED)
                        .header("Cache-Control", "max-age=60")
                        .body("made")
                }
            }),
        ]
        .into();

        let request = || Context::new(Request::new(Method::Get, "/a").header("Host", "h"));
        let miss = Next::new(Arc::clone(&chain)).run(request()).await;
        let hit = Next::new(chain).run(request()).await;

        assert_eq!(miss.headers().get(CACHE_STATUS_HEADER), Some("miss"));
        assert_eq!(hit.headers().get(CACHE_STATUS_HEADER), Some("hit"));
        assert_eq!(hit.status(), StatusCode::CREATED);
        assert_eq!(hit.body_ref(), b"made");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
