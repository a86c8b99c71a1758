//! `GET /v1/sessions` and `GET /v1/sessions/{id}` (spec §4.9, §6): callers
//! may only list/read their own sessions unless they hold an admin role.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use gw_auth::AuthenticatedPrincipal;
use gw_core::{GatewayError, PrincipalId};
use gw_session::ListSessionsOptions;
use serde::{Deserialize, Serialize};

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub user_id: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<gw_session::ChatSession>,
    pub total: u64,
    pub has_more: bool,
    pub page: u32,
    pub page_size: u32,
}

/// Resolves the `user_id` query param against the caller's own identity:
/// admins may request any user's sessions, everyone else only their own
/// (spec §6: "own user unless admin").
fn resolve_target_user(
    principal: &gw_core::Principal,
    requested: Option<&str>,
) -> Result<PrincipalId, GatewayError> {
    match requested {
        None => Ok(principal.id.clone()),
        Some(user_id) if principal.is_admin() || user_id == principal.id.to_string() => {
            Ok(PrincipalId::from(user_id.to_string()))
        }
        Some(_) => Err(GatewayError::Forbidden),
    }
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(AuthenticatedPrincipal(principal)): Extension<AuthenticatedPrincipal>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    let target = resolve_target_user(&principal, query.user_id.as_deref())?;
    let (sessions, total, has_more) = state
        .sessions
        .list_sessions(
            &target,
            query.page,
            query.page_size,
            ListSessionsOptions {
                include_archived: query.include_archived,
            },
        )
        .await?;

    Ok(Json(ListSessionsResponse {
        sessions,
        total,
        has_more,
        page: query.page,
        page_size: query.page_size,
    }))
}

#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    pub session: gw_session::ChatSession,
    pub messages: Vec<gw_session::StoredMessage>,
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(AuthenticatedPrincipal(principal)): Extension<AuthenticatedPrincipal>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionDetailResponse>, ApiError> {
    let session_id = session_id.into();
    let (session, messages) = state
        .sessions
        .get_session(&session_id, &principal.id, principal.is_admin())
        .await?;
    Ok(Json(SessionDetailResponse { session, messages }))
}
