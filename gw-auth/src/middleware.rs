//! Tiered access enforcement (spec §4.3, C3): classifies a route as
//! public / authenticated / admin and enforces it as an axum middleware.
//! CORS, body-size limits, and the HTTP tracing layer are ambient
//! `tower-http` concerns wired by `gw-server` around this middleware,
//! mirroring the layer stack in the teacher's `adk-server` router setup.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use gw_core::{GatewayError, Principal, TraceId};
use std::sync::Arc;

use crate::validator::CredentialValidator;

/// Access tier a route requires (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTier {
    Public,
    Authenticated,
    Admin,
}

/// Extracted and injected into request extensions on a successful
/// authenticated/admin check; handlers pull it back out with
/// `Extension<AuthenticatedPrincipal>`.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

const BEARER_PREFIX: &str = "Bearer ";

fn extract_bearer(req: &Request) -> Result<&str, GatewayError> {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(GatewayError::MissingBearer)?;
    let value = header.to_str().map_err(|_| GatewayError::MalformedBearer)?;
    value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(GatewayError::MalformedBearer)
}

/// Wraps a handler with the given [`AccessTier`]'s enforcement. `Public`
/// routes pass straight through (after trace-id assignment); `Authenticated`
/// and `Admin` run the credential chain via `validator`.
pub async fn enforce_tier(
    validator: Arc<CredentialValidator>,
    tier: AccessTier,
    mut req: Request,
    next: Next,
) -> Response {
    req.extensions_mut().insert(TraceId::generate());

    if tier == AccessTier::Public {
        return next.run(req).await;
    }

    let bearer = match extract_bearer(&req) {
        Ok(bearer) => bearer,
        Err(e) => return gateway_error_response(e),
    };

    let principal = match validator.validate(bearer).await {
        Ok(p) => p,
        Err(e) => return gateway_error_response(e),
    };

    if tier == AccessTier::Admin && !principal.is_admin() {
        return gateway_error_response(GatewayError::Forbidden);
    }

    req.extensions_mut()
        .insert(AuthenticatedPrincipal(principal));
    next.run(req).await
}

fn gateway_error_response(err: GatewayError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({ "error": err.public_message() });
    (status, axum::Json(body)).into_response()
}
