//! Holds live agent handles and their advertised models (spec §4.6, C6).

use crate::agent::Agent;
use gw_core::AgentName;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MIN_HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(30);

struct ProbeState {
    last_probe: Instant,
    healthy: bool,
}

/// Read-mostly map from agent name to handle, plus a reverse model-id
/// index rebuilt whenever an agent's model list changes. Ambiguous model
/// ids resolve to the primary agent (spec §4.6).
pub struct AgentRegistry {
    agents: dashmap::DashMap<AgentName, Arc<dyn Agent>>,
    model_index: dashmap::DashMap<String, AgentName>,
    probes: dashmap::DashMap<AgentName, ProbeState>,
    primary: AgentName,
}

impl AgentRegistry {
    pub fn new(primary: AgentName) -> Self {
        Self {
            agents: dashmap::DashMap::new(),
            model_index: dashmap::DashMap::new(),
            probes: dashmap::DashMap::new(),
            primary,
        }
    }

    pub fn primary_name(&self) -> &AgentName {
        &self.primary
    }

    pub fn register(&self, name: AgentName, agent: Arc<dyn Agent>) {
        self.agents.insert(name, agent);
    }

    pub fn get(&self, name: &AgentName) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).map(|entry| entry.clone())
    }

    pub fn primary(&self) -> Option<Arc<dyn Agent>> {
        self.get(&self.primary)
    }

    /// Resolves a model id to the agent that should serve it, falling back
    /// to the primary agent on a miss (spec §4.7 step 2 handles the
    /// fallback; this just reports the index lookup).
    pub fn resolve_for_model(&self, model_id: &str) -> Option<AgentName> {
        self.model_index.get(model_id).map(|entry| entry.clone())
    }

    /// Rebuilds the model-id → agent-name reverse index. Processes the
    /// primary agent first so ties ("ambiguous model ids") resolve to it.
    pub async fn rebuild_model_index(&self) {
        self.model_index.clear();
        let mut names: Vec<AgentName> = self.agents.iter().map(|e| e.key().clone()).collect();
        names.sort_by_key(|n| n != &self.primary);

        for name in names {
            let Some(agent) = self.get(&name) else { continue };
            match agent.models().await {
                Ok(models) => {
                    for model in models {
                        self.model_index.entry(model.id).or_insert_with(|| name.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(agent = %name, error = %e, "failed to list models while rebuilding index");
                }
            }
        }
    }

    pub fn all_model_ids(&self) -> Vec<String> {
        self.model_index.iter().map(|e| e.key().clone()).collect()
    }

    /// Full `ModelInfo` for every id the reverse index currently claims,
    /// for the `/v1/models` listing (spec §4.7). Groups by owning agent so
    /// each agent's `models()` is only called once, then filters to the
    /// ids `model_index` still attributes to that agent (ties already
    /// resolved to the primary by `rebuild_model_index`).
    pub async fn model_infos(&self) -> Vec<gw_core::ModelInfo> {
        let mut by_agent: std::collections::HashMap<AgentName, Vec<String>> =
            std::collections::HashMap::new();
        for entry in self.model_index.iter() {
            by_agent
                .entry(entry.value().clone())
                .or_default()
                .push(entry.key().clone());
        }

        let mut out = Vec::new();
        for (name, ids) in by_agent {
            let Some(agent) = self.get(&name) else { continue };
            match agent.models().await {
                Ok(models) => {
                    out.extend(models.into_iter().filter(|m| ids.contains(&m.id)));
                }
                Err(e) => {
                    tracing::warn!(agent = %name, error = %e, "failed to list models while building model list");
                }
            }
        }
        out
    }

    /// Cheap probe, called on a timer (spec §4.6: ">= 30s interval") and
    /// opportunistically before routing if the last probe is stale.
    pub async fn ensure_fresh_health(&self, name: &AgentName) -> bool {
        let stale = self
            .probes
            .get(name)
            .map(|p| p.last_probe.elapsed() >= MIN_HEALTH_PROBE_INTERVAL)
            .unwrap_or(true);
        if !stale {
            return self.probes.get(name).map(|p| p.healthy).unwrap_or(false);
        }
        self.probe_one(name).await
    }

    async fn probe_one(&self, name: &AgentName) -> bool {
        let Some(agent) = self.get(name) else { return false };
        let healthy = agent.healthy().await;
        self.probes.insert(
            name.clone(),
            ProbeState {
                last_probe: Instant::now(),
                healthy,
            },
        );
        healthy
    }

    /// Probes every registered agent once. Intended to be driven by a
    /// caller-owned `tokio::time::interval` loop at >= 30s cadence.
    pub async fn probe_all(&self) {
        let names: Vec<AgentName> = self.agents.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.probe_one(&name).await;
        }
    }

    pub fn open_agent_count(&self) -> usize {
        self.agents.len()
    }

    pub async fn close_all(&self) {
        for entry in self.agents.iter() {
            entry.value().close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentChunkStream, AgentParams, AgentResponse};
    use async_trait::async_trait;
    use gw_core::{ChatMessage, FinishReason, GatewayError, ModelInfo, Usage};

    struct StubAgent {
        models: Vec<&'static str>,
        healthy: bool,
    }

    #[async_trait]
    impl Agent for StubAgent {
        async fn execute(
            &self,
            _messages: &[ChatMessage],
            _model: &str,
            _params: &AgentParams,
        ) -> Result<AgentResponse, GatewayError> {
            Ok(AgentResponse {
                content: "ok".to_string(),
                finish_reason: FinishReason::Stop,
                usage: Usage::new(1, 1),
            })
        }

        async fn stream(
            &self,
            _messages: &[ChatMessage],
            _model: &str,
            _params: &AgentParams,
        ) -> Result<AgentChunkStream, GatewayError> {
            unimplemented!()
        }

        async fn models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
            Ok(self
                .models
                .iter()
                .map(|id| ModelInfo {
                    id: id.to_string(),
                    object: ModelInfo::object_kind(),
                    created: 0,
                    owned_by: "gateway".to_string(),
                })
                .collect())
        }

        async fn healthy(&self) -> bool {
            self.healthy
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn ambiguous_model_resolves_to_primary() {
        let registry = AgentRegistry::new(AgentName::from("primary".to_string()));
        registry.register(
            AgentName::from("primary".to_string()),
            Arc::new(StubAgent {
                models: vec!["shared-model"],
                healthy: true,
            }),
        );
        registry.register(
            AgentName::from("fallback".to_string()),
            Arc::new(StubAgent {
                models: vec!["shared-model"],
                healthy: true,
            }),
        );

        registry.rebuild_model_index().await;

        assert_eq!(
            registry.resolve_for_model("shared-model"),
            Some(AgentName::from("primary".to_string()))
        );
    }

    #[tokio::test]
    async fn unclaimed_model_resolves_to_none() {
        let registry = AgentRegistry::new(AgentName::from("primary".to_string()));
        registry.rebuild_model_index().await;
        assert_eq!(registry.resolve_for_model("nope"), None);
    }

    #[tokio::test]
    async fn probe_all_marks_health_state() {
        let registry = AgentRegistry::new(AgentName::from("primary".to_string()));
        registry.register(
            AgentName::from("primary".to_string()),
            Arc::new(StubAgent {
                models: vec![],
                healthy: false,
            }),
        );
        registry.probe_all().await;
        assert!(!registry.ensure_fresh_health(&AgentName::from("primary".to_string())).await);
    }
}
