//! Axum middleware wiring for [`AppState`]: thin per-tier wrappers around
//! `gw_auth::enforce_tier`, plus the rate-limit gate that runs inside the
//! authenticated/admin tiers (spec §4.3, §4.4).

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use gw_auth::{AccessTier, AuthenticatedPrincipal, enforce_tier};
use gw_core::GatewayError;

pub async fn public_tier(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce_tier(state.validator.clone(), AccessTier::Public, req, next).await
}

pub async fn authenticated_tier(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce_tier(state.validator.clone(), AccessTier::Authenticated, req, next).await
}

pub async fn admin_tier(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce_tier(state.validator.clone(), AccessTier::Admin, req, next).await
}

/// Consumes one unit of the caller's request budget (spec §4.4). Must run
/// behind `authenticated_tier`/`admin_tier` so `AuthenticatedPrincipal` is
/// already in request extensions. Admins bypass the check entirely
/// (`Principal::bypasses_rate_limit`).
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(AuthenticatedPrincipal(principal)) = req.extensions().get::<AuthenticatedPrincipal>().cloned()
    else {
        return ApiError(GatewayError::Other(anyhow::anyhow!(
            "rate_limit_middleware ran without an authenticated principal"
        )))
        .into_response();
    };

    if principal.bypasses_rate_limit() {
        return next.run(req).await;
    }

    let decision = state.rate_limiter.check(principal.id.as_ref()).await;
    if !decision.allowed {
        let retry_after_secs = decision
            .reset_at_epoch_secs
            .saturating_sub(chrono::Utc::now().timestamp())
            .max(0) as u64;
        return ApiError(GatewayError::RateLimited { retry_after_secs }).into_response();
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.reset_at_epoch_secs.to_string()) {
        headers.insert("X-RateLimit-Reset", v);
    }
    response
}
