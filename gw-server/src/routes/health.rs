//! `/health`, `/ready`, `/live`, `/metrics` (spec §4.13, C13). All four are
//! public-tier routes (spec §4.3).

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use serde_json::json;

/// Always 200 once the process is accepting connections (spec §4.13).
pub async fn live() -> impl IntoResponse {
    StatusCode::OK
}

/// 200 only once every required collaborator has completed its startup
/// probe (spec §4.13); 503 while any are still pending.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.readiness.all_ready() {
        (StatusCode::OK, Json(json!({ "ready": true }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ready": false,
                "storage": state.readiness.storage_ready(),
                "kv": state.readiness.kv_ready(),
                "agents": state.readiness.agents_ready(),
            })),
        )
            .into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
enum AggregateStatus {
    Up,
    Degraded,
    Down,
}

/// Aggregated UP/DEGRADED/DOWN status with a per-component breakdown
/// (spec §4.13: "database reachability, KV reachability, primary-agent
/// health, and open circuit-breaker count").
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let storage_ok = state.storage.ping().await;
    let primary_healthy = match state.registry.primary() {
        Some(agent) => agent.healthy().await,
        None => false,
    };
    let open_breakers = state.breakers.open_count().await;

    let status = if storage_ok && primary_healthy {
        AggregateStatus::Up
    } else if storage_ok || primary_healthy {
        AggregateStatus::Degraded
    } else {
        AggregateStatus::Down
    };

    let code = match status {
        AggregateStatus::Up => StatusCode::OK,
        AggregateStatus::Degraded => StatusCode::OK,
        AggregateStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        code,
        Json(json!({
            "status": status,
            "components": {
                "storage": storage_ok,
                "primary_agent": primary_healthy,
                "open_circuit_breakers": open_breakers,
                "agents_registered": state.registry.open_agent_count(),
            },
        })),
    )
        .into_response()
}

/// Prometheus text exposition (spec §4.13).
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.encode().await;
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        body,
    )
}
