//! Media gallery service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server (trace, timeout, request id)
//!                          │
//!                          ▼
//!                     route guard ──▶ rate limiter ──▶ Redis (shared windows)
//!                          │               └────────▶ local windows (fallback)
//!                          ▼
//!                     authenticator (token | legacy)
//!                          │
//!                          ▼
//!                     handler ──▶ key sanitizer ──▶ object store
//!
//!     Cross-cutting: config (+ hot reload), observability, lifecycle
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use media_gallery::config::watcher::ConfigWatcher;
use media_gallery::config::{load_config, GalleryConfig};
use media_gallery::http::{AppState, HttpServer};
use media_gallery::lifecycle::{wait_for_signal, Shutdown};
use media_gallery::observability::{logging, metrics};
use media_gallery::security::audit::LoginAudit;
use media_gallery::security::clock::{Clock, SystemClock};
use media_gallery::security::rate_limit::{RateLimiter, RedisStore, SharedStore};
use media_gallery::storage::store_from_config;

#[derive(Parser)]
#[command(name = "media-gallery")]
#[command(about = "Media gallery API with token auth and rate limiting", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GALLERY_CONFIG", default_value = "gallery.toml")]
    config: PathBuf,

    /// Reload auth and limits when the config file changes.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "media-gallery starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        strategy = ?config.auth.strategy,
        rate_limit_enabled = config.rate_limit.enabled,
        storage_backend = ?config.storage.backend,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let shared = connect_shared_store(&config).await;
    let store_timeout = Duration::from_millis(config.rate_limit.store_timeout_ms);

    let limiter = Arc::new(RateLimiter::new(shared.clone(), clock.clone(), store_timeout));
    let audit = Arc::new(LoginAudit::new(shared, clock.clone(), store_timeout));
    let store = store_from_config(&config.storage, clock.clone()).await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let state = AppState::new(config, limiter, store, audit, clock);

    let _watcher = if args.watch {
        let (watcher, mut updates) = ConfigWatcher::new(&args.config);
        let watcher = watcher.run()?;
        let reload_state = state.clone();
        tokio::spawn(async move {
            while let Some(new_config) = updates.recv().await {
                reload_state.reload(new_config);
            }
        });
        Some(watcher)
    } else {
        None
    };

    let shutdown = Shutdown::new();
    let server = HttpServer::new(state);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Connect to Redis when configured. Failure leaves the limiter counting locally.
async fn connect_shared_store(config: &GalleryConfig) -> Option<Arc<dyn SharedStore>> {
    let url = config.rate_limit.redis_url.as_deref()?;
    match RedisStore::connect(url).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable at startup, rate limits enforced per instance");
            None
        }
    }
}
