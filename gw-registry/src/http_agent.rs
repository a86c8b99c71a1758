//! HTTP-backed agent handle: calls an upstream OpenAI-compatible
//! `/v1/chat/completions` endpoint (spec §1: "each wrapping a child process
//! or upstream API"; the concrete subprocess protocol is explicitly out of
//! scope — spec §1 — so this is the one concrete, in-scope transport).

use crate::agent::{Agent, AgentChunk, AgentChunkStream, AgentParams, AgentResponse};
use async_stream::try_stream;
use async_trait::async_trait;
use gw_core::{ChatMessage, FinishReason, GatewayError, ModelInfo, Usage};
use std::time::Duration;

#[derive(Debug, serde::Serialize)]
struct UpstreamRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, serde::Deserialize)]
struct UpstreamChoice {
    message: Option<ChatMessage>,
    delta: Option<UpstreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct UpstreamDelta {
    content: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct UpstreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, serde::Deserialize)]
struct UpstreamCompletion {
    choices: Vec<UpstreamChoice>,
    usage: Option<UpstreamUsage>,
}

fn parse_finish_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("length") => FinishReason::Length,
        Some("error") => FinishReason::Error,
        _ => FinishReason::Stop,
    }
}

pub struct HttpAgent {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpAgent {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .unwrap_or_default(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn models_url(&self) -> String {
        format!("{}/v1/models", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Agent for HttpAgent {
    async fn execute(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &AgentParams,
    ) -> Result<AgentResponse, GatewayError> {
        let body = UpstreamRequest {
            model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            stream: false,
        };
        let response = self
            .client
            .post(self.completions_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::AgentUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::AgentUnavailable(format!(
                "agent {} returned status {}",
                self.name,
                response.status()
            )));
        }

        let completion: UpstreamCompletion = response
            .json()
            .await
            .map_err(|e| GatewayError::AgentUnavailable(e.to_string()))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::AgentUnavailable(format!("agent {} returned no choices", self.name)))?;
        let content = choice.message.map(|m| m.content).unwrap_or_default();
        let finish_reason = parse_finish_reason(choice.finish_reason.as_deref());
        let usage = completion
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_else(|| Usage::new(0, 0));

        Ok(AgentResponse {
            content,
            finish_reason,
            usage,
        })
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &AgentParams,
    ) -> Result<AgentChunkStream, GatewayError> {
        let body = UpstreamRequest {
            model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            stream: true,
        };
        let response = self
            .client
            .post(self.completions_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::AgentUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::AgentUnavailable(format!(
                "agent {} returned status {}",
                self.name,
                response.status()
            )));
        }

        let name = self.name.clone();
        let stream = try_stream! {
            use futures::StreamExt;
            let mut bytes_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = bytes_stream.next().await {
                let chunk = chunk.map_err(|e| GatewayError::AgentUnavailable(e.to_string()))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find("\n\n") {
                    let event = buffer[..pos].to_string();
                    buffer.drain(..pos + 2);
                    let Some(data) = event.strip_prefix("data: ") else { continue };
                    if data == "[DONE]" {
                        continue;
                    }
                    let parsed: UpstreamCompletion = serde_json::from_str(data)
                        .map_err(|e| GatewayError::AgentUnavailable(format!("agent {name}: {e}")))?;
                    let Some(choice) = parsed.choices.into_iter().next() else { continue };
                    let delta = choice.delta.and_then(|d| d.content);
                    let finish_reason = choice.finish_reason.as_deref().map(|r| parse_finish_reason(Some(r)));
                    let usage = parsed.usage.map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));
                    yield AgentChunk { delta, finish_reason, usage };
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        let response = self
            .client
            .get(self.models_url())
            .send()
            .await
            .map_err(|e| GatewayError::AgentUnavailable(e.to_string()))?;
        let list: gw_core::ModelList = response
            .json()
            .await
            .map_err(|e| GatewayError::AgentUnavailable(e.to_string()))?;
        Ok(list.data)
    }

    async fn healthy(&self) -> bool {
        self.client
            .get(self.models_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn close(&self) {}
}
