//! Shared types for the chat-completion gateway: identifiers, the
//! authenticated-principal model, OpenAI-compatible wire types, and the
//! top-level error taxonomy every other `gw-*` crate builds on.

mod chat;
mod error;
mod ids;
mod principal;

pub use chat::{
    ChatChoice, ChatChunkChoice, ChatCompletionChunk, ChatCompletionRequest,
    ChatCompletionResponse, ChatDelta, ChatMessage, FinishReason, MessageRole, ModelInfo,
    ModelList, Usage,
};
pub use error::{GatewayError, Result};
pub use ids::{AgentName, OrgId, PrincipalId, SessionId, TraceId};
pub use principal::{AuthMethod, Principal, Role};
