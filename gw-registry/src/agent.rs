//! The agent capability set (spec §4.6, §9): "polymorphic agents, not
//! inheritance" — a flat trait any backend (subprocess, HTTP client, mock)
//! can implement, mirroring `adk_core::Llm`'s `generate_content` shape but
//! split into the explicit `execute`/`stream` pair spec §4.6 calls for.

use async_trait::async_trait;
use futures::stream::Stream;
use gw_core::{ChatMessage, FinishReason, GatewayError, ModelInfo, Usage};
use std::pin::Pin;

#[derive(Debug, Clone, Copy)]
pub struct AgentParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// One element of an agent's streaming output. The sequence MUST terminate
/// with a chunk carrying `finish_reason` and `usage` (spec §4.6).
#[derive(Debug, Clone, Default)]
pub struct AgentChunk {
    pub delta: Option<String>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
}

pub type AgentChunkStream = Pin<Box<dyn Stream<Item = Result<AgentChunk, GatewayError>> + Send>>;

/// A concrete completion backend. Implementors: subprocess wrapper, HTTP
/// client against an upstream API, or a test mock (spec §4.6, §9).
#[async_trait]
pub trait Agent: Send + Sync {
    /// Synchronous completion.
    async fn execute(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &AgentParams,
    ) -> Result<AgentResponse, GatewayError>;

    /// Incremental completion. Chunks are ordered; the final chunk carries
    /// the finish reason and cumulative usage.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        params: &AgentParams,
    ) -> Result<AgentChunkStream, GatewayError>;

    /// Ids, display names, advertised capabilities, owning provider.
    async fn models(&self) -> Result<Vec<ModelInfo>, GatewayError>;

    /// Cheap liveness probe.
    async fn healthy(&self) -> bool;

    /// Terminate the underlying process/connection.
    async fn close(&self);
}
