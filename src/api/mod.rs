use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;

/// Full application router: unauthenticated health check plus the
/// management API under `/api/v1`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .nest("/api/v1", api_router(state.clone()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Build the management API router.
/// All routes are relative; the caller mounts this under `/api/v1`.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(handlers::whoami))
        .route("/permissions/check", get(handlers::check_permission))
        .route("/roles", get(handlers::list_roles))
        .route("/roles/:user_id", get(handlers::get_role).put(handlers::assign_role))
        .route(
            "/approvals",
            get(handlers::list_approvals).post(handlers::create_approval),
        )
        .route("/approvals/:id", get(handlers::get_approval))
        .route(
            "/approvals/:id/votes",
            get(handlers::list_votes).post(handlers::cast_vote),
        )
        .route("/locks", get(handlers::list_locks))
        .route("/locks/:environment", get(handlers::get_lock))
        .route("/locks/:environment/lock", post(handlers::lock_environment))
        .route("/locks/:environment/unlock", post(handlers::unlock_environment))
        .route("/audit", get(handlers::list_audit))
        .route("/events", get(handlers::stream_events))
        .layer(middleware::from_fn_with_state(state, api_auth))
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Middleware: validates the `X-Api-Key` header (or bearer token) against
/// the configured API key. Returns 401 if missing or invalid.
async fn api_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided_key = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim())
        });

    match provided_key {
        Some(k) if k == state.config.api_key => Ok(next.run(req).await),
        Some(k) => {
            // Never log the expected key or the full provided key.
            let masked = if k.len() > 8 {
                format!("{}…{}", &k[..4], &k[k.len() - 4..])
            } else {
                "****".to_string()
            };
            tracing::warn!("api: invalid key (provided: '{}')", masked);
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("api: missing X-Api-Key header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
