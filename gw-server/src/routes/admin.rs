//! `/api/v1/platform/*` (admin tier, spec §6). Thin reads against the
//! storage REST data-plane via [`crate::state::StorageClient`] plus a
//! snapshot of process-local collaborator state; there is no dedicated
//! "platform" crate, these are cross-cutting views over the others.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use gw_core::GatewayError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct PlatformStats {
    pub registered_agents: usize,
    pub open_circuit_breakers: usize,
    pub advertised_models: usize,
    pub audit_events_dropped: u64,
}

pub async fn platform_stats(State(state): State<AppState>) -> Json<PlatformStats> {
    Json(PlatformStats {
        registered_agents: state.registry.open_agent_count(),
        open_circuit_breakers: state.breakers.open_count().await,
        advertised_models: state.registry.all_model_ids().len(),
        audit_events_dropped: state.audit.dropped_count(),
    })
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PlatformAdminRow {
    id: String,
    org_id: String,
    email: String,
    display_name: String,
    role: String,
}

/// Every principal row marked `admin` or `platform_admin` (spec §3
/// `Principal.role`).
pub async fn platform_admins(State(state): State<AppState>) -> Result<Json<Vec<PlatformAdminRow>>, ApiError> {
    let (body, _) = state
        .storage
        .get_json("/principals?role=in.(admin,platform_admin)")
        .await?;
    let rows: Vec<PlatformAdminRow> = serde_json::from_value(body)
        .map_err(|e| GatewayError::Storage(format!("malformed principals row: {e}")))?;
    Ok(Json(rows))
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Serialize)]
pub struct AuditListResponse {
    pub events: Vec<serde_json::Value>,
    pub total: Option<u64>,
}

/// `GET /api/v1/platform/audit?limit&offset` (spec §6): a raw, paginated
/// read over `audit_events` — append-only, never mutated (spec §8).
pub async fn platform_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditListResponse>, ApiError> {
    let path = format!(
        "/audit_events?order=occurred_at.desc&limit={}&offset={}",
        query.limit, query.offset
    );
    let (body, content_range) = state.storage.get_json(&path).await?;
    let events: Vec<serde_json::Value> = match body {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    let total = content_range.and_then(|range| {
        range
            .rsplit('/')
            .next()
            .and_then(|total| total.parse::<u64>().ok())
    });
    Ok(Json(AuditListResponse { events, total }))
}
