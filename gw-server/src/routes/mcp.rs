//! `POST /api/mcp/oauth/{init,callback,revoke}` (spec §4.11 steps 1-4,
//! §6). Thin wrappers over `gw_mcp::OAuthFlow`; MCP tool invocation itself
//! (`McpOperations`) has no HTTP surface in this gateway.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Extension, State};
use gw_auth::AuthenticatedPrincipal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct OAuthInitRequest {
    pub mcp_name: String,
    pub provider: String,
    pub redirect_uri: String,
}

#[derive(Debug, Serialize)]
pub struct OAuthInitResponse {
    pub auth_url: String,
    pub state: String,
}

pub async fn oauth_init(
    State(state): State<AppState>,
    Extension(AuthenticatedPrincipal(principal)): Extension<AuthenticatedPrincipal>,
    Json(request): Json<OAuthInitRequest>,
) -> Result<Json<OAuthInitResponse>, ApiError> {
    let result = state
        .oauth_flow
        .initiate(
            &principal.id,
            &principal.org_id,
            &request.mcp_name,
            &request.provider,
            &request.redirect_uri,
        )
        .await?;
    Ok(Json(OAuthInitResponse {
        auth_url: result.authorization_url,
        state: result.state,
    }))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackRequest {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

pub async fn oauth_callback(
    State(state): State<AppState>,
    Json(request): Json<OAuthCallbackRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    state.oauth_flow.callback(&request.code, &request.state).await?;
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
pub struct OAuthRevokeRequest {
    pub provider: String,
}

pub async fn oauth_revoke(
    State(state): State<AppState>,
    Extension(AuthenticatedPrincipal(principal)): Extension<AuthenticatedPrincipal>,
    Json(request): Json<OAuthRevokeRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    state.oauth_flow.revoke(&principal.id, &request.provider).await?;
    Ok(Json(OkResponse { ok: true }))
}
