//! # rttp-cache
//!
//! HTTP response caching for the rttp async HTTP/1.1 stack, plus a caching
//! reverse proxy binary built from it.
//!
//! A request flows through [`CacheMiddleware`](cache::CacheMiddleware): its
//! key is derived from host, URI, and (optionally) method, headers, and body;
//! a stored response is replayed on a hit; on a miss the request goes on down
//! the chain and the response is stored if HTTP caching rules (or a
//! force-cache override) allow. Every response carries a `Cache-Status` of
//! `hit`, `miss`, or `error`. Cache failures never fail the request.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rttp_cache::cache::{BackendRegistry, CacheMiddleware};
//! use rttp_cache::config::{BackendConfig, CacheConfig};
//! use rttp_cache::context::Context;
//! use rttp_cache::middleware::{Next, from_handler, from_middleware};
//! use rttp_cache::server::Server;
//! use rttp_cache::{Request, Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CacheConfig {
//!         backend: BackendConfig::memory(),
//!         ..CacheConfig::default()
//!     };
//!     let cache = CacheMiddleware::new(&config, Arc::new(BackendRegistry::new()));
//!     let chain: Arc<[_]> = vec![
//!         from_middleware(Arc::new(cache)),
//!         from_handler(|_ctx| async {
//!             Response::new(StatusCode::OK)
//!                 .header("Cache-Control", "max-age=60")
//!                 .body("Hello, World!")
//!         }),
//!     ]
//!     .into();
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server
//!         .run(move |req: Request| Next::new(Arc::clone(&chain)).run(Context::new(req)))
//!         .await?;
//!     Ok(())
//! }
//! ```

// ── Protocol and pipeline ─────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod server;

// ── Caching ───────────────────────────────────────────────────────────────────
pub mod cache;
pub mod config;

// ── Upstream ──────────────────────────────────────────────────────────────────
pub mod proxy;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
