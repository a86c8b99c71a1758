//! Exercises the gateway end to end through a real [`axum::Router`] built
//! by [`gw_server::build_router`], with stub collaborators standing in for
//! the storage/agent backends (spec §8, scenario 1: "happy static path",
//! plus the missing/malformed-bearer scenarios).

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use gw_audit::{AuditEvent, AuditLogger, AuditWriter};
use gw_auth::{ApiKeyRecord, ApiKeyStore, CredentialValidator, PrincipalLookup};
use gw_breaker::BreakerRegistry;
use gw_core::{
    AgentName, ChatMessage, FinishReason, GatewayError, ModelInfo, OrgId, PrincipalId, SessionId,
    Usage,
};
use gw_keys::KeyCache;
use gw_mcp::{OAuthFlow, OAuthStateRow, OAuthStateStore, McpError};
use gw_orchestrator::Orchestrator;
use gw_ratelimit::{RateLimitConfig, RateLimiter};
use gw_registry::{Agent, AgentChunkStream, AgentParams, AgentRegistry, AgentResponse};
use gw_server::state::{Readiness, StorageClient};
use gw_server::{build_router, AppState};
use gw_session::{ChatSession, ListSessionsOptions, NewTurn, SessionStore, StoredMessage};
use gw_vault::{RestOAuthTokenStore, TokenVault, VaultKey};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct StubAgent;

#[async_trait]
impl Agent for StubAgent {
    async fn execute(
        &self,
        _messages: &[ChatMessage],
        _model: &str,
        _params: &AgentParams,
    ) -> Result<AgentResponse, GatewayError> {
        Ok(AgentResponse {
            content: "hello from the stub agent".to_string(),
            finish_reason: FinishReason::Stop,
            usage: Usage::new(5, 7),
        })
    }

    async fn stream(
        &self,
        _messages: &[ChatMessage],
        _model: &str,
        _params: &AgentParams,
    ) -> Result<AgentChunkStream, GatewayError> {
        unimplemented!("not exercised by this test")
    }

    async fn models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        Ok(vec![ModelInfo {
            id: "stub-model".to_string(),
            object: ModelInfo::object_kind(),
            created: 0,
            owned_by: "gateway".to_string(),
        }])
    }

    async fn healthy(&self) -> bool {
        true
    }

    async fn close(&self) {}
}

struct StubAuditWriter;

#[async_trait]
impl AuditWriter for StubAuditWriter {
    async fn write_batch(&self, _events: &[AuditEvent]) -> Result<(), GatewayError> {
        Ok(())
    }
}

struct StubApiKeyStore;

#[async_trait]
impl ApiKeyStore for StubApiKeyStore {
    async fn lookup_by_hash(&self, _hash: &str) -> Result<Option<ApiKeyRecord>, GatewayError> {
        Ok(None)
    }

    async fn touch_last_used(&self, _hash: &str) {}
}

struct StubPrincipalLookup;

#[async_trait]
impl PrincipalLookup for StubPrincipalLookup {
    async fn is_platform_admin(&self, _subject: &str) -> bool {
        false
    }
}

struct StubSessionStore;

#[async_trait]
impl SessionStore for StubSessionStore {
    async fn create_session(
        &self,
        _user_id: &PrincipalId,
        _org_id: &OrgId,
        _agent_type: &str,
        _title: Option<String>,
        _metadata: Option<Value>,
    ) -> Result<SessionId, GatewayError> {
        Ok(SessionId::generate())
    }

    async fn append_messages(
        &self,
        _session_id: &SessionId,
        _turns: Vec<NewTurn>,
    ) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn list_sessions(
        &self,
        _user_id: &PrincipalId,
        _page: u32,
        _page_size: u32,
        _options: ListSessionsOptions,
    ) -> Result<(Vec<ChatSession>, u64, bool), GatewayError> {
        Ok((Vec::new(), 0, false))
    }

    async fn get_session(
        &self,
        _session_id: &SessionId,
        _requester: &PrincipalId,
        _requester_is_admin: bool,
    ) -> Result<(ChatSession, Vec<StoredMessage>), GatewayError> {
        Err(GatewayError::NotFound("session not found".to_string()))
    }

    async fn archive(&self, _session_id: &SessionId, _user_id: &PrincipalId) -> Result<(), GatewayError> {
        Ok(())
    }
}

struct StubOAuthStateStore;

#[async_trait]
impl OAuthStateStore for StubOAuthStateStore {
    async fn insert(&self, _row: &OAuthStateRow) -> Result<(), McpError> {
        Ok(())
    }

    async fn consume(&self, _state: &str) -> Result<Option<OAuthStateRow>, McpError> {
        Ok(None)
    }

    async fn sweep_expired(&self) -> Result<u64, McpError> {
        Ok(0)
    }
}

const STATIC_KEY: &str = "test-static-key";

async fn build_test_state() -> AppState {
    let static_credential = gw_config::StaticCredentialConfig {
        key: STATIC_KEY.to_string(),
        user_id: "u-1".to_string(),
        org_id: "o-1".to_string(),
        email: "u1@example.com".to_string(),
        name: "Test User".to_string(),
    };

    let validator = Arc::new(CredentialValidator::new(
        Some(static_credential),
        Arc::new(StubApiKeyStore),
        Vec::new(),
        Arc::new(KeyCache::with_http_fetcher()),
        Arc::new(StubPrincipalLookup),
    ));

    let rate_limiter = Arc::new(RateLimiter::new(
        RateLimitConfig {
            requests_per_minute: 60,
            burst: 10,
        },
        None,
    ));

    let breakers = Arc::new(BreakerRegistry::new(gw_breaker::BreakerConfig::default()));

    let primary = AgentName::from("primary".to_string());
    let registry = Arc::new(AgentRegistry::new(primary.clone()));
    registry.register(primary.clone(), Arc::new(StubAgent));
    registry.rebuild_model_index().await;

    let audit = AuditLogger::spawn(Arc::new(StubAuditWriter), None);
    let metrics = Arc::new(gw_server::metrics::GatewayMetrics::new(breakers.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        registry.clone(),
        breakers.clone(),
        Arc::new(audit.clone()),
        metrics.clone(),
        None,
        Duration::from_secs(30),
    ));

    let sessions: Arc<dyn SessionStore> = Arc::new(StubSessionStore);

    let vault = Arc::new(TokenVault::new(
        Box::new(RestOAuthTokenStore::new(
            "http://127.0.0.1:0",
            "service-role-token",
        )),
        VaultKey::from_bytes([7u8; 32]),
    ));
    let oauth_flow = Arc::new(OAuthFlow::new(
        Box::new(StubOAuthStateStore),
        vault,
        audit.clone(),
        std::collections::HashMap::new(),
    ));

    let readiness = Arc::new(Readiness::new(false));
    readiness.mark_storage_ready();
    readiness.mark_agents_ready();

    AppState {
        validator,
        rate_limiter,
        breakers,
        registry,
        orchestrator,
        sessions,
        audit: Arc::new(audit),
        oauth_flow,
        storage: StorageClient::new("http://127.0.0.1:0", "service-role-token"),
        readiness,
        metrics,
        max_body_bytes: 1024 * 1024,
        cors_origins: Vec::new(),
    }
}

#[tokio::test]
async fn live_is_always_up() {
    let router = build_router(build_test_state().await);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/live")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn chat_completion_without_bearer_is_unauthorized() {
    let router = build_router(build_test_state().await);
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "model": "stub-model",
                        "messages": [{"role": "user", "content": "hi"}],
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_completion_with_malformed_bearer_is_rejected() {
    let router = build_router(build_test_state().await);
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header("authorization", "Token not-a-bearer-scheme")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "model": "stub-model",
                        "messages": [{"role": "user", "content": "hi"}],
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn happy_static_path_returns_completion() {
    let router = build_router(build_test_state().await);
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header("authorization", format!("Bearer {STATIC_KEY}"))
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "model": "stub-model",
                        "messages": [{"role": "user", "content": "hi"}],
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["choices"][0]["message"]["content"], "hello from the stub agent");
    assert_eq!(json["usage"]["prompt_tokens"], 5);
    assert_eq!(json["usage"]["completion_tokens"], 7);
}

#[tokio::test]
async fn invalid_temperature_is_a_validation_error() {
    let router = build_router(build_test_state().await);
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header("authorization", format!("Bearer {STATIC_KEY}"))
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "model": "stub-model",
                        "messages": [{"role": "user", "content": "hi"}],
                        "temperature": 9.0,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn platform_stats_requires_admin_tier_but_static_key_is_platform_admin() {
    let router = build_router(build_test_state().await);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/platform/stats")
                .header("authorization", format!("Bearer {STATIC_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["registered_agents"], 1);
}
