//! `GET /v1/models` (spec §4.7, §6): union of every agent's advertised
//! models, duplicate ids already resolved to the primary agent by
//! `AgentRegistry::rebuild_model_index`.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use gw_core::ModelList;

pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    Json(ModelList::new(state.registry.model_infos().await))
}
