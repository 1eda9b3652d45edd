//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all gallery handlers
//! - Wrap each route in its rate-limit / auth guard
//! - Wire up middleware (tracing, timeout, request ID)
//! - Hold the hot-swappable live state (config + authenticator)
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post, MethodRouter},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GalleryConfig;
use crate::http::handlers;
use crate::http::middleware::{guard_middleware, Access, RouteGuard};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::security::audit::LoginAudit;
use crate::security::auth::{authenticator_from_config, Authenticator};
use crate::security::clock::Clock;
use crate::security::rate_limit::{OperationClass, RateLimiter};
use crate::storage::ObjectStore;

/// Multipart framing allowance on top of the largest accepted file.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// The part of the state replaced on config reload.
pub struct LiveState {
    pub config: GalleryConfig,
    pub authenticator: Arc<dyn Authenticator>,
}

impl LiveState {
    pub fn new(config: GalleryConfig, clock: Arc<dyn Clock>) -> Self {
        let authenticator = authenticator_from_config(&config.auth, clock);
        Self {
            config,
            authenticator,
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    live: Arc<ArcSwap<LiveState>>,
    pub limiter: Arc<RateLimiter>,
    pub store: Arc<dyn ObjectStore>,
    pub audit: Arc<LoginAudit>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        config: GalleryConfig,
        limiter: Arc<RateLimiter>,
        store: Arc<dyn ObjectStore>,
        audit: Arc<LoginAudit>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let live = LiveState::new(config, clock.clone());
        Self {
            live: Arc::new(ArcSwap::from_pointee(live)),
            limiter,
            store,
            audit,
            clock,
        }
    }

    /// Snapshot of the current config and authenticator.
    pub fn live(&self) -> Arc<LiveState> {
        self.live.load_full()
    }

    /// Swap in a validated config. In-flight requests keep their snapshot.
    pub fn reload(&self, config: GalleryConfig) {
        let live = LiveState::new(config, self.clock.clone());
        tracing::info!(
            strategy = ?live.authenticator.strategy(),
            "Configuration reloaded"
        );
        self.live.store(Arc::new(live));
    }
}

/// HTTP server for the gallery API.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(&state);
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: &AppState) -> Router {
        let live = state.live();
        let upload_body_limit = usize::try_from(live.config.storage.max_file_size_bytes)
            .unwrap_or(usize::MAX)
            .saturating_add(MULTIPART_OVERHEAD_BYTES);

        let guarded = |route: MethodRouter<AppState>, class, access| {
            route.route_layer(from_fn_with_state(
                (state.clone(), RouteGuard::new(class, access)),
                guard_middleware,
            ))
        };

        Router::new()
            .route(
                "/api/login",
                guarded(post(handlers::login), OperationClass::Login, Access::Public),
            )
            .route(
                "/api/list",
                guarded(get(handlers::list), OperationClass::List, Access::Read),
            )
            .route(
                "/api/upload",
                guarded(
                    post(handlers::upload).layer(DefaultBodyLimit::max(upload_body_limit)),
                    OperationClass::Upload,
                    Access::Owner,
                )
                .merge(guarded(
                    axum::routing::delete(handlers::delete),
                    OperationClass::Delete,
                    Access::Owner,
                )),
            )
            .route(
                "/r2/{key}",
                guarded(get(handlers::fetch_object), OperationClass::ObjectFetch, Access::Read),
            )
            .route("/health", get(handlers::health))
            .with_state(state.clone())
            .layer(TimeoutLayer::new(Duration::from_secs(live.config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            strategy = ?self.state.live().authenticator.strategy(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}
