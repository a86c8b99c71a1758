//! Shared collaborator bundle injected into every handler via axum's
//! `State` extractor, following the `ServerConfig`-holding controller
//! pattern this codebase uses elsewhere.

use crate::metrics::GatewayMetrics;
use gw_audit::AuditLogger;
use gw_auth::CredentialValidator;
use gw_breaker::BreakerRegistry;
use gw_mcp::OAuthFlow;
use gw_orchestrator::Orchestrator;
use gw_ratelimit::RateLimiter;
use gw_registry::AgentRegistry;
use gw_session::SessionStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Tracks whether each required collaborator has completed at least one
/// successful startup probe (spec §4.13, `/ready`).
pub struct Readiness {
    storage: AtomicBool,
    kv: AtomicBool,
    kv_configured: bool,
    agents: AtomicBool,
}

impl Readiness {
    pub fn new(kv_configured: bool) -> Self {
        Self {
            storage: AtomicBool::new(false),
            kv: AtomicBool::new(false),
            kv_configured,
            agents: AtomicBool::new(false),
        }
    }

    pub fn mark_storage_ready(&self) {
        self.storage.store(true, Ordering::SeqCst);
    }

    pub fn mark_kv_ready(&self) {
        self.kv.store(true, Ordering::SeqCst);
    }

    pub fn mark_agents_ready(&self) {
        self.agents.store(true, Ordering::SeqCst);
    }

    pub fn storage_ready(&self) -> bool {
        self.storage.load(Ordering::SeqCst)
    }

    pub fn kv_ready(&self) -> bool {
        !self.kv_configured || self.kv.load(Ordering::SeqCst)
    }

    pub fn agents_ready(&self) -> bool {
        self.agents.load(Ordering::SeqCst)
    }

    pub fn all_ready(&self) -> bool {
        self.storage_ready() && self.kv_ready() && self.agents_ready()
    }
}

/// Minimal REST-data-plane client for the admin-only reads that don't
/// otherwise have a dedicated collaborator (platform stats, audit log
/// listing) — same bearer-auth-over-`reqwest` idiom as every other
/// `Rest*` store in this workspace.
#[derive(Clone)]
pub struct StorageClient {
    client: reqwest::Client,
    endpoint: String,
    credential: String,
}

impl StorageClient {
    pub fn new(rest_endpoint: impl Into<String>, service_role_credential: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: rest_endpoint.into(),
            credential: service_role_credential.into(),
        }
    }

    pub async fn ping(&self) -> bool {
        self.client
            .get(format!("{}/", self.endpoint.trim_end_matches('/')))
            .bearer_auth(&self.credential)
            .send()
            .await
            .map(|r| r.status().as_u16() < 500)
            .unwrap_or(false)
    }

    pub async fn get_json(&self, path_and_query: &str) -> Result<(serde_json::Value, Option<String>), gw_core::GatewayError> {
        let url = format!("{}{}", self.endpoint.trim_end_matches('/'), path_and_query);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.credential)
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(|e| gw_core::GatewayError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(gw_core::GatewayError::Storage(format!(
                "storage read failed with status {}",
                response.status()
            )));
        }
        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .json()
            .await
            .map_err(|e| gw_core::GatewayError::Storage(e.to_string()))?;
        Ok((body, content_range))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub validator: Arc<CredentialValidator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub breakers: Arc<BreakerRegistry>,
    pub registry: Arc<AgentRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<dyn SessionStore>,
    pub audit: Arc<AuditLogger>,
    pub oauth_flow: Arc<OAuthFlow>,
    pub storage: StorageClient,
    pub readiness: Arc<Readiness>,
    pub metrics: Arc<GatewayMetrics>,
    pub max_body_bytes: usize,
    pub cors_origins: Vec<String>,
}
