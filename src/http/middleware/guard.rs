//! Rate-limit and authentication guard.
//!
//! Every gallery route is wrapped in this middleware with its operation class
//! and access level. Checks run in a fixed order and stop at the first failure:
//!
//! ```text
//! request
//!     → resolve client address (configured header, else "unknown")
//!     → rate limiter, class:client      → 429 + Retry-After
//!     → credential (bearer / legacy)     → 401
//!     → handler (Identity in extensions when authenticated)
//! ```
//!
//! Nothing here touches the object store.

use std::collections::HashMap;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Query, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::GalleryError;
use crate::http::request::{request_id, ClientAddress};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::auth::{AuthFailure, Credential};
use crate::security::rate_limit::OperationClass;

/// Who may call a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// No credential checked (login verifies its own body).
    Public,
    /// Credential optional when guest reads are enabled; a bad one is still 401.
    Read,
    /// A valid credential is required.
    Owner,
}

#[derive(Debug, Clone, Copy)]
pub struct RouteGuard {
    pub class: OperationClass,
    pub access: Access,
}

impl RouteGuard {
    pub const fn new(class: OperationClass, access: Access) -> Self {
        Self { class, access }
    }
}

pub async fn guard_middleware(
    State((state, guard)): State<(AppState, RouteGuard)>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let op = guard.class.as_str();

    let response = match check(&state, guard, req).await {
        Ok(req) => next.run(req).await,
        Err(e) => e.into_response(),
    };

    metrics::record_request(op, response.status().as_u16(), start);
    response
}

async fn check(
    state: &AppState,
    guard: RouteGuard,
    mut req: Request<Body>,
) -> Result<Request<Body>, GalleryError> {
    let live = state.live();
    let client = ClientAddress::from_headers(req.headers(), &live.config.rate_limit.client_ip_header);

    if live.config.rate_limit.enabled {
        let limit = live.config.rate_limit.limit_for(guard.class);
        let decision = state
            .limiter
            .check(&guard.class.identifier(client.as_str()), limit)
            .await;

        if !decision.allowed {
            let retry_after_secs = decision.retry_after_secs(state.clock.now_millis());
            tracing::warn!(
                request_id = %request_id(req.headers()),
                client = %client.as_str(),
                op = guard.class.as_str(),
                retry_after_secs,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(guard.class.as_str());
            return Err(GalleryError::Throttled {
                retry_after_secs,
                reset_at: decision.reset_at,
            });
        }
    }

    if guard.access != Access::Public {
        let query: HashMap<String, String> = Query::try_from_uri(req.uri())
            .map(|Query(q)| q)
            .unwrap_or_default();
        let credential = Credential::from_request(req.headers(), &query);

        match live.authenticator.authenticate(&credential) {
            Ok(identity) => {
                req.extensions_mut().insert(identity);
            }
            Err(AuthFailure::Missing) if guard.access == Access::Read && live.config.auth.guest_read => {
                tracing::debug!(client = %client.as_str(), op = guard.class.as_str(), "Guest access");
            }
            Err(failure) => {
                tracing::warn!(
                    request_id = %request_id(req.headers()),
                    client = %client.as_str(),
                    op = guard.class.as_str(),
                    reason = %failure,
                    "Authentication failed"
                );
                metrics::record_auth_failure(guard.class.as_str());
                return Err(GalleryError::Unauthorized);
            }
        }
    }

    req.extensions_mut().insert(client);
    Ok(req)
}
