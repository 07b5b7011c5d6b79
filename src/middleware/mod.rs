//! Middleware pipeline: composable before/after request handler logic.
//!
//! Each middleware wraps the next layer, so it can inspect the request,
//! short-circuit with its own response, or decorate what the downstream
//! layers produce. The caching layer is one such middleware
//! ([`CacheMiddleware`](crate::cache::CacheMiddleware)); the upstream
//! forwarder is the terminal handler at the end of the chain.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining middleware chain.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] / [`from_handler`]: build a [`MiddlewareHandler`].
//! - [`LoggerMiddleware`]: access log that also tags each request with a [`RequestId`].

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response, StatusCode, context::Context};

/// Boxed future returned by every layer of the pipeline.
pub type BoxResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A type-erased, reference-counted middleware function.
///
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> BoxResponseFuture + Send + Sync + 'static>;

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed on each call to [`run`](Self::run), so a middleware can
/// forward a request at most once.
///
/// # Examples
///
/// ```rust,no_run
/// use rttp_cache::{Response, context::Context, middleware::{Middleware, Next, BoxResponseFuture}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(&self, ctx: Context, next: Next) -> BoxResponseFuture {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    index: usize,
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given middleware stack.
    pub fn new(middlewares: impl Into<Arc<[MiddlewareHandler]>>) -> Self {
        Self {
            middlewares: middlewares.into(),
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// If the chain is exhausted without any layer producing a response, a
    /// `500 Internal Server Error` is returned as a safe fallback.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => Response::new(StatusCode::INTERNAL_SERVER_ERROR)
                .body("No response generated by middleware pipeline"),
        }
    }
}

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Wraps a terminal handler (one that never calls `next`) as a [`MiddlewareHandler`].
///
/// ```rust,no_run
/// use rttp_cache::{Response, StatusCode, middleware::from_handler};
///
/// let hello = from_handler(|_ctx| async { Response::new(StatusCode::OK).body("hi") });
/// ```
pub fn from_handler<H, F>(handler: H) -> MiddlewareHandler
where
    H: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |ctx: Context, _next: Next| Box::pin(handler(ctx)))
}

/// The core trait for all middleware.
///
/// Implementations must be `Send + Sync` because middleware is shared across
/// Tokio tasks, and must not hold `&mut` references to shared state across an
/// `.await` point.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> BoxResponseFuture;
}

/// Identifier attached to every request for log and alert correlation.
///
/// Taken from the inbound `X-Request-Id` header when the proxy in front of us
/// set one, otherwise a fresh UUID v4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub const HEADER: &'static str = "X-Request-Id";

    pub fn from_request(request: &Request) -> Self {
        match request.headers().get(Self::HEADER) {
            Some(id) if !id.trim().is_empty() => Self(id.trim().to_owned()),
            _ => Self(uuid::Uuid::new_v4().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logs each request's method, target, status, cache disposition, and duration.
///
/// Also stores a [`RequestId`] in the context extensions so later layers log
/// under the same identifier.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, mut ctx: Context, next: Next) -> BoxResponseFuture {
        Box::pin(async move {
            let start = Instant::now();
            let request_id = RequestId::from_request(ctx.request());
            let method = ctx.request().method().to_string();
            let target = ctx.request().uri();
            ctx.extensions_mut().insert(request_id.clone());

            let response = next.run(ctx).await;

            let cache = response
                .headers()
                .get(crate::cache::CACHE_STATUS_HEADER)
                .unwrap_or("-")
                .to_owned();
            tracing::info!(
                request_id = %request_id,
                status = response.status().as_u16(),
                cache = %cache,
                elapsed = ?start.elapsed(),
                "{} {}",
                method,
                target
            );

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    #[tokio::test]
    async fn exhausted_chain_returns_500() {
        let next = Next::new(Vec::<MiddlewareHandler>::new());
        let res = next.run(Context::new(Request::new(Method::Get, "/"))).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn logger_tags_request_id() {
        let seen = from_handler(|ctx: Context| async move {
            let id = ctx
                .extensions()
                .get::<RequestId>()
                .map(|id| id.0.clone())
                .unwrap_or_default();
            Response::new(StatusCode::OK).body(id)
        });
        let chain = vec![from_middleware(Arc::new(LoggerMiddleware)), seen];
        let req = Request::new(Method::Get, "/").header("X-Request-Id", "req-1");

        let res = Next::new(chain).run(Context::new(req)).await;
        assert_eq!(res.body_ref(), b"req-1");
    }

    #[test]
    fn request_id_generated_when_missing() {
        let id = RequestId::from_request(&Request::new(Method::Get, "/"));
        assert_eq!(id.as_str().len(), 36);
    }
}
