//! Builds the gateway's [`axum::Router`]: one `Router::new().route(...)`
//! call per endpoint in spec §6, grouped by access tier (spec §4.3) with
//! the tier middleware applied per-group, plus the ambient `tower-http`
//! layers (CORS, body-size limit, request tracing) wrapped around the
//! whole thing — mirroring the teacher's `adk-server` layer stack.

use crate::middleware::{admin_tier, authenticated_tier, public_tier, rate_limit_middleware};
use crate::routes::{admin, chat, health, mcp, models, sessions};
use crate::state::AppState;
use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/live", get(health::live))
        .route("/metrics", get(health::metrics))
        .route_layer(middleware::from_fn_with_state(state.clone(), public_tier));

    let authenticated_routes = Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/models", get(models::list_models))
        .route("/v1/sessions", get(sessions::list_sessions))
        .route("/v1/sessions/{id}", get(sessions::get_session))
        .route("/api/mcp/oauth/init", post(mcp::oauth_init))
        .route("/api/mcp/oauth/callback", post(mcp::oauth_callback))
        .route("/api/mcp/oauth/revoke", post(mcp::oauth_revoke))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            authenticated_tier,
        ));

    let admin_routes = Router::new()
        .route("/api/v1/platform/stats", get(admin::platform_stats))
        .route("/api/v1/platform/admins", get(admin::platform_admins))
        .route("/api/v1/platform/audit", get(admin::platform_audit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_tier));

    let cors = build_cors_layer(&state.cors_origins);
    let max_body_bytes = state.max_body_bytes;

    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(5 * 60)))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(cors)
        .with_state(state)
}

/// Permissive CORS for the configured origin allowlist (spec §4.3). An
/// empty allowlist means "no cross-origin access granted" rather than
/// "allow all" — callers opt in per deployment.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}
