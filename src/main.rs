//! `rttp-cache`: a caching reverse proxy.
//!
//! Serves `LoggerMiddleware → CacheMiddleware → HttpUpstream` on the
//! configured address until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rttp_cache::Request;
use rttp_cache::cache::{BackendRegistry, CacheMiddleware};
use rttp_cache::config::Config;
use rttp_cache::context::Context;
use rttp_cache::middleware::{LoggerMiddleware, MiddlewareHandler, Next, from_middleware};
use rttp_cache::proxy::HttpUpstream;
use rttp_cache::server::Server;

#[derive(Parser, Debug)]
#[command(name = "rttp-cache", version, about = "Caching reverse proxy", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, env = "RTTP_CACHE_CONFIG")]
    config: PathBuf,

    /// Listen address, overriding the one in the configuration file
    #[arg(long, env = "RTTP_CACHE_LISTEN")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_file(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    let registry = Arc::new(BackendRegistry::new());
    let chain: Arc<[MiddlewareHandler]> = vec![
        from_middleware(Arc::new(LoggerMiddleware)),
        from_middleware(Arc::new(CacheMiddleware::new(&config.cache, registry))),
        HttpUpstream::new(&config.upstream)?.into_handler(),
    ]
    .into();

    let server = Server::bind(&config.listen).await?;
    info!(
        upstream = %config.upstream,
        env = %config.cache.env,
        backend = ?config.cache.backend.kind,
        "cache proxy ready"
    );

    server
        .run_until(
            move |request: Request| Next::new(Arc::clone(&chain)).run(Context::new(request)),
            shutdown_signal(),
        )
        .await?;

    info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}
