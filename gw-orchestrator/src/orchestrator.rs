//! Primary/fallback agent selection and streaming fan-out (spec §4.7, C7).

use crate::metrics::MetricsRecorder;
use futures::StreamExt;
use gw_audit::{AuditEventBuilder, AuditLogger};
use gw_breaker::BreakerRegistry;
use gw_core::{AgentName, ChatCompletionRequest, GatewayError, Principal, Usage};
use gw_registry::{Agent, AgentChunk, AgentChunkStream, AgentParams, AgentRegistry, AgentResponse};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn breaker_key(agent_name: &AgentName) -> String {
    format!("call_tool:{agent_name}")
}

fn breaker_to_gateway_error(err: gw_breaker::BreakerError<GatewayError>) -> GatewayError {
    match err {
        gw_breaker::BreakerError::Open {
            operation,
            retry_after_secs,
        } => GatewayError::CircuitOpen {
            operation,
            retry_after_secs,
        },
        gw_breaker::BreakerError::TooManyRequests { operation } => {
            GatewayError::TooManyRequests { operation }
        }
        gw_breaker::BreakerError::OperationFailed(e) => e,
    }
}

fn to_params(request: &ChatCompletionRequest) -> AgentParams {
    AgentParams {
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        top_p: request.top_p,
    }
}

pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    breakers: Arc<BreakerRegistry>,
    audit: Arc<AuditLogger>,
    metrics: Arc<dyn MetricsRecorder>,
    /// The well-known secondary agent name, if fallback is enabled
    /// (spec §4.7 step 3). `None` disables the retry-once behavior
    /// entirely, matching `AgentConfig::fallback_enabled = false`.
    fallback_agent: Option<AgentName>,
    completion_deadline: Duration,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<AgentRegistry>,
        breakers: Arc<BreakerRegistry>,
        audit: Arc<AuditLogger>,
        metrics: Arc<dyn MetricsRecorder>,
        fallback_agent: Option<AgentName>,
        completion_deadline: Duration,
    ) -> Self {
        Self {
            registry,
            breakers,
            audit,
            metrics,
            fallback_agent,
            completion_deadline,
        }
    }

    fn resolve(&self, model: &str) -> Result<(AgentName, Arc<dyn Agent>), GatewayError> {
        let name = self
            .registry
            .resolve_for_model(model)
            .unwrap_or_else(|| self.registry.primary_name().clone());
        let agent = self
            .registry
            .get(&name)
            .ok_or_else(|| GatewayError::UnknownModel(model.to_string()))?;
        Ok((name, agent))
    }

    fn emit_audit(
        &self,
        principal: &Principal,
        model: &str,
        outcome: &str,
        agent_name: &AgentName,
        usage: Option<&Usage>,
        latency: Duration,
    ) {
        Self::record_completion_audit(
            &self.audit,
            principal,
            model,
            outcome,
            agent_name,
            usage,
            latency,
        );
    }

    fn record_completion_audit(
        audit: &AuditLogger,
        principal: &Principal,
        model: &str,
        outcome: &str,
        agent_name: &AgentName,
        usage: Option<&Usage>,
        latency: Duration,
    ) {
        let details = serde_json::json!({
            "model": model,
            "agent": agent_name.to_string(),
            "latency_ms": latency.as_millis() as u64,
            "prompt_tokens": usage.map(|u| u.prompt_tokens),
            "completion_tokens": usage.map(|u| u.completion_tokens),
        });
        let event = AuditEventBuilder::new(principal.id.to_string(), "chat.completion", outcome)
            .org_id(principal.org_id.to_string())
            .resource("agent", agent_name.to_string())
            .details(details)
            .build();
        audit.emit(event);
    }

    /// Non-streaming completion (spec §4.7 step 3, non-streaming sub-case).
    pub async fn execute(
        &self,
        principal: &Principal,
        request: &ChatCompletionRequest,
    ) -> Result<(AgentName, AgentResponse), GatewayError> {
        request
            .validate()
            .map_err(GatewayError::Validation)?;
        let params = to_params(request);
        let (agent_name, agent) = self.resolve(&request.model)?;

        match tokio::time::timeout(
            self.completion_deadline,
            self.execute_with_fallback(&agent_name, &agent, principal, request, &params),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                self.emit_audit(principal, &request.model, "error", &agent_name, None, self.completion_deadline);
                Err(GatewayError::Timeout)
            }
        }
    }

    async fn execute_with_fallback(
        &self,
        agent_name: &AgentName,
        agent: &Arc<dyn Agent>,
        principal: &Principal,
        request: &ChatCompletionRequest,
        params: &AgentParams,
    ) -> Result<(AgentName, AgentResponse), GatewayError> {
        let started = Instant::now();
        let breaker = self.breakers.get_or_create(&breaker_key(agent_name));
        let primary_result = breaker
            .run(agent.execute(&request.messages, &request.model, params))
            .await;

        match primary_result {
            Ok(response) => {
                self.emit_audit(principal, &request.model, "ok", agent_name, Some(&response.usage), started.elapsed());
                self.metrics
                    .record_completion(&request.model, "ok", started.elapsed(), &response.usage);
                Ok((agent_name.clone(), response))
            }
            Err(primary_err) => {
                let primary_err = breaker_to_gateway_error(primary_err);
                let Some(fallback_name) = self
                    .fallback_agent
                    .clone()
                    .filter(|name| name != agent_name)
                else {
                    self.emit_audit(principal, &request.model, "error", agent_name, None, started.elapsed());
                    return Err(primary_err);
                };
                let Some(fallback_agent) = self.registry.get(&fallback_name) else {
                    self.emit_audit(principal, &request.model, "error", agent_name, None, started.elapsed());
                    return Err(primary_err);
                };

                let fallback_breaker = self.breakers.get_or_create(&breaker_key(&fallback_name));
                match fallback_breaker
                    .run(fallback_agent.execute(&request.messages, &request.model, params))
                    .await
                {
                    Ok(response) => {
                        self.emit_audit(
                            principal,
                            &request.model,
                            "fallback",
                            &fallback_name,
                            Some(&response.usage),
                            started.elapsed(),
                        );
                        self.metrics.record_completion(
                            &request.model,
                            "fallback",
                            started.elapsed(),
                            &response.usage,
                        );
                        Ok((fallback_name, response))
                    }
                    Err(fallback_err) => {
                        self.emit_audit(principal, &request.model, "error", &fallback_name, None, started.elapsed());
                        Err(breaker_to_gateway_error(fallback_err))
                    }
                }
            }
        }
    }

    /// Opens a stream on `agent` through its breaker and pulls the first
    /// chunk, so the caller can decide whether to fall back before any
    /// content has been forwarded (spec §4.7 step 3, streaming sub-case).
    async fn open_and_peek(
        &self,
        name: &AgentName,
        agent: &Arc<dyn Agent>,
        request: &ChatCompletionRequest,
        params: &AgentParams,
    ) -> Result<(AgentChunk, AgentChunkStream), GatewayError> {
        let breaker = self.breakers.get_or_create(&breaker_key(name));
        let mut inner = breaker
            .run(agent.stream(&request.messages, &request.model, params))
            .await
            .map_err(breaker_to_gateway_error)?;

        match inner.next().await {
            Some(Ok(chunk)) => Ok((chunk, inner)),
            Some(Err(e)) => Err(e),
            None => Err(GatewayError::AgentUnavailable(format!(
                "agent {name} closed stream before producing a chunk"
            ))),
        }
    }

    /// Streaming completion. Falls back only if no chunk was produced yet;
    /// once content has been forwarded, a mid-stream error terminates the
    /// stream with an error marker rather than retrying (spec §4.7 step 3).
    pub async fn stream(
        &self,
        principal: &Principal,
        request: &ChatCompletionRequest,
    ) -> Result<AgentChunkStream, GatewayError> {
        request
            .validate()
            .map_err(GatewayError::Validation)?;
        let params = to_params(request);
        let (agent_name, agent) = self.resolve(&request.model)?;
        let started = Instant::now();

        let (chosen_name, first_chunk, rest) =
            match self.open_and_peek(&agent_name, &agent, request, &params).await {
                Ok((chunk, rest)) => (agent_name.clone(), chunk, rest),
                Err(primary_err) => {
                    let fallback = self
                        .fallback_agent
                        .clone()
                        .filter(|name| name != &agent_name);
                    let Some(fallback_name) = fallback else {
                        self.emit_audit(principal, &request.model, "error", &agent_name, None, started.elapsed());
                        return Err(primary_err);
                    };
                    let Some(fallback_agent) = self.registry.get(&fallback_name) else {
                        self.emit_audit(principal, &request.model, "error", &agent_name, None, started.elapsed());
                        return Err(primary_err);
                    };
                    match self
                        .open_and_peek(&fallback_name, &fallback_agent, request, &params)
                        .await
                    {
                        Ok((chunk, rest)) => (fallback_name, chunk, rest),
                        Err(fallback_err) => {
                            self.emit_audit(principal, &request.model, "error", &fallback_name, None, started.elapsed());
                            return Err(fallback_err);
                        }
                    }
                }
            };

        let audit = self.audit.clone();
        let metrics = self.metrics.clone();
        let model = request.model.clone();
        let principal = principal.clone();
        let routed_name = chosen_name.clone();
        let came_from_fallback = chosen_name != agent_name;
        let deadline = self.completion_deadline;

        let output = async_stream::stream! {
            let mut rest = rest;
            let mut last_usage: Option<Usage> = None;
            let mut saw_error = false;

            if let Some(usage) = &first_chunk.usage {
                last_usage = Some(usage.clone());
            }
            yield Ok(first_chunk);

            loop {
                if started.elapsed() >= deadline {
                    saw_error = true;
                    yield Err(GatewayError::Timeout);
                    break;
                }
                match rest.next().await {
                    Some(Ok(chunk)) => {
                        if let Some(usage) = &chunk.usage {
                            last_usage = Some(usage.clone());
                        }
                        yield Ok(chunk);
                    }
                    Some(Err(e)) => {
                        saw_error = true;
                        yield Err(e);
                        break;
                    }
                    None => break,
                }
            }

            let outcome = if saw_error {
                "error"
            } else if came_from_fallback {
                "fallback"
            } else {
                "ok"
            };
            let usage = last_usage.unwrap_or_else(|| Usage::new(0, 0));
            Orchestrator::record_completion_audit(
                &audit,
                &principal,
                &model,
                outcome,
                &routed_name,
                Some(&usage),
                started.elapsed(),
            );
            metrics.record_completion(&model, outcome, started.elapsed(), &usage);
        };

        Ok(Box::pin(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gw_breaker::BreakerConfig;
    use gw_core::{ChatMessage, FinishReason, MessageRole, ModelInfo, OrgId, PrincipalId, Role};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedAgent {
        models: Vec<&'static str>,
        fail: Arc<std::sync::atomic::AtomicBool>,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        async fn execute(
            &self,
            _messages: &[ChatMessage],
            _model: &str,
            _params: &AgentParams,
        ) -> Result<AgentResponse, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(GatewayError::AgentUnavailable("boom".to_string()));
            }
            Ok(AgentResponse {
                content: "hi".to_string(),
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(GatewayError::AgentUnavailable("boom".to_string()));
            }
            let chunks = vec![
                Ok(AgentChunk {
                    delta: Some("hi".to_string()),
                    finish_reason: None,
                    usage: None,
                }),
                Ok(AgentChunk {
                    delta: None,
                    finish_reason: Some(FinishReason::Stop),
                    usage: Some(Usage::new(1, 1)),
                }),
            ];
            Ok(Box::pin(tokio_stream::iter(chunks)))
        }

        async fn models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
            Ok(self
                .models
                .iter()
                .map(|id| ModelInfo {
                    id: id.to_string(),
                    object: ModelInfo::object_kind(),
                    created: 0,
                    owned_by: "test".to_string(),
                })
                .collect())
        }

        async fn healthy(&self) -> bool {
            true
        }

        async fn close(&self) {}
    }

    fn principal() -> Principal {
        Principal {
            id: PrincipalId::from("u1".to_string()),
            org_id: OrgId::from("o1".to_string()),
            email: "u1@example.com".to_string(),
            display_name: "U1".to_string(),
            role: Role::User,
            auth_method: gw_core::AuthMethod::Static,
        }
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "m1".to_string(),
            messages: vec![ChatMessage {
                role: MessageRole::User,
                content: "hi".to_string(),
            }],
            temperature: 0.7,
            max_tokens: 100,
            top_p: 1.0,
            stream: false,
            user: None,
            session_id: None,
        }
    }

    async fn make_orchestrator(
        fail_primary: bool,
        fallback_enabled: bool,
    ) -> (Orchestrator, Arc<AtomicU32>, Arc<AtomicU32>) {
        let registry = Arc::new(AgentRegistry::new(AgentName::from("primary".to_string())));
        let primary_calls = Arc::new(AtomicU32::new(0));
        let fallback_calls = Arc::new(AtomicU32::new(0));

        registry.register(
            AgentName::from("primary".to_string()),
            Arc::new(ScriptedAgent {
                models: vec!["m1"],
                fail: Arc::new(std::sync::atomic::AtomicBool::new(fail_primary)),
                calls: primary_calls.clone(),
            }),
        );
        registry.register(
            AgentName::from("fallback".to_string()),
            Arc::new(ScriptedAgent {
                models: vec![],
                fail: Arc::new(std::sync::atomic::AtomicBool::new(false)),
                calls: fallback_calls.clone(),
            }),
        );
        registry.rebuild_model_index().await;

        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));
        let audit = Arc::new(AuditLogger::spawn(
            Arc::new(NoopAuditWriter),
            Some(16),
        ));
        let fallback_name = fallback_enabled.then(|| AgentName::from("fallback".to_string()));

        let orchestrator = Orchestrator::new(
            registry,
            breakers,
            audit,
            Arc::new(crate::metrics::NoopMetricsRecorder),
            fallback_name,
            Duration::from_secs(5),
        );
        (orchestrator, primary_calls, fallback_calls)
    }

    struct NoopAuditWriter;

    #[async_trait]
    impl gw_audit::AuditWriter for NoopAuditWriter {
        async fn write_batch(&self, _events: &[gw_audit::AuditEvent]) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn execute_succeeds_on_primary() {
        let (orchestrator, primary_calls, fallback_calls) = make_orchestrator(false, true).await;
        let (agent_name, response) = orchestrator.execute(&principal(), &request()).await.unwrap();
        assert_eq!(agent_name, AgentName::from("primary".to_string()));
        assert_eq!(response.content, "hi");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn execute_falls_back_once_on_primary_failure() {
        let (orchestrator, primary_calls, fallback_calls) = make_orchestrator(true, true).await;
        let (agent_name, _) = orchestrator.execute(&principal(), &request()).await.unwrap();
        assert_eq!(agent_name, AgentName::from("fallback".to_string()));
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn execute_returns_error_when_fallback_disabled() {
        let (orchestrator, _, fallback_calls) = make_orchestrator(true, false).await;
        let err = orchestrator.execute(&principal(), &request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::AgentUnavailable(_)));
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stream_falls_back_when_primary_fails_before_first_chunk() {
        let (orchestrator, _, _) = make_orchestrator(true, true).await;
        let mut stream = orchestrator.stream(&principal(), &request()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.delta.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn unknown_model_falls_through_to_primary_agent() {
        let (orchestrator, primary_calls, _) = make_orchestrator(false, true).await;
        let mut req = request();
        req.model = "does-not-exist".to_string();
        let (agent_name, _) = orchestrator.execute(&principal(), &req).await.unwrap();
        assert_eq!(agent_name, AgentName::from("primary".to_string()));
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    }
}
