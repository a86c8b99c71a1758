//! `POST /v1/chat/completions` (spec §4.7, §4.8, C7): resolves a model to
//! an agent, runs it through the orchestrator's breaker/fallback path, and
//! records the turn in the session store. Body is parsed manually from
//! `Bytes` rather than via the `Json<T>` extractor so a malformed body
//! routes through [`ApiError`]'s uniform `{"error",..,"code"}` shape
//! instead of axum's default rejection body.

use crate::error::ApiError;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures::StreamExt;
use gw_auth::AuthenticatedPrincipal;
use gw_core::{
    ChatChoice, ChatChunkChoice, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
    ChatDelta, ChatMessage, GatewayError, MessageRole, Principal, PrincipalId, Usage,
};
use gw_registry::AgentChunkStream;
use gw_session::{NewTurn, SessionStore};
use std::sync::Arc;

fn effective_principal(principal: &Principal, request: &ChatCompletionRequest) -> Principal {
    match &request.user {
        Some(user) if principal.is_admin() => Principal {
            id: PrincipalId::from(user.clone()),
            ..principal.clone()
        },
        _ => principal.clone(),
    }
}

/// Appends the newest user turn and the assistant's reply. `messages` in
/// the request is the full model input, not a replay buffer — on a
/// resumed session only the latest turn is new, so only the latest turn
/// (plus the reply) is persisted; replaying the whole array on every call
/// would duplicate rows each round-trip.
async fn record_session(
    sessions: &Arc<dyn SessionStore>,
    principal: &Principal,
    request: &ChatCompletionRequest,
    assistant_content: &str,
    usage: &Usage,
) -> Result<String, GatewayError> {
    let mut turns = Vec::with_capacity(2);
    if let Some(last) = request.messages.last() {
        if last.role == MessageRole::User {
            turns.push(NewTurn {
                role: MessageRole::User,
                content: last.content.clone(),
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: 0,
            });
        }
    }
    turns.push(NewTurn {
        role: MessageRole::Assistant,
        content: assistant_content.to_string(),
        prompt_tokens: 0,
        completion_tokens: usage.completion_tokens,
    });

    let session_id = match &request.session_id {
        Some(existing) => {
            let sid = existing.clone().into();
            sessions.append_messages(&sid, turns).await?;
            sid
        }
        None => {
            let sid = sessions
                .create_session(&principal.id, &principal.org_id, &request.model, None, None)
                .await?;
            sessions.append_messages(&sid, turns).await?;
            sid
        }
    };
    Ok(session_id.to_string())
}

fn error_chunk(model: &str, id: &str, created: i64) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: ChatCompletionChunk::object_kind(),
        created,
        model: model.to_string(),
        choices: vec![ChatChunkChoice {
            index: 0,
            delta: ChatDelta::default(),
            finish_reason: Some(gw_core::FinishReason::Error),
        }],
    }
}

fn sse_event(chunk: &ChatCompletionChunk) -> Event {
    Event::default().data(serde_json::to_string(chunk).unwrap_or_default())
}

fn build_sse_stream(
    state: AppState,
    principal: Principal,
    request: ChatCompletionRequest,
    mut inner: AgentChunkStream,
) -> impl futures::Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
        let created = Utc::now().timestamp();
        let mut content = String::new();
        let mut usage = Usage::new(0, 0);
        let mut first = true;

        loop {
            match inner.next().await {
                Some(Ok(chunk)) => {
                    if let Some(u) = &chunk.usage {
                        usage = u.clone();
                    }
                    if let Some(delta) = &chunk.delta {
                        content.push_str(delta);
                    }
                    let wire = ChatCompletionChunk {
                        id: id.clone(),
                        object: ChatCompletionChunk::object_kind(),
                        created,
                        model: request.model.clone(),
                        choices: vec![ChatChunkChoice {
                            index: 0,
                            delta: ChatDelta {
                                role: first.then_some(MessageRole::Assistant),
                                content: chunk.delta.clone(),
                            },
                            finish_reason: chunk.finish_reason,
                        }],
                    };
                    first = false;
                    yield Ok(sse_event(&wire));
                }
                Some(Err(_)) => {
                    yield Ok(sse_event(&error_chunk(&request.model, &id, created)));
                    break;
                }
                None => break,
            }
        }

        if let Err(e) = record_session(&state.sessions, &principal, &request, &content, &usage).await {
            tracing::error!(error = %e, "failed to persist streamed session turn");
        }

        yield Ok(Event::default().data("[DONE]"));
    }
}

pub async fn chat_completions(
    State(state): State<AppState>,
    Extension(AuthenticatedPrincipal(principal)): Extension<AuthenticatedPrincipal>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: ChatCompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::Validation(format!("malformed request body: {e}")))?;
    request.validate().map_err(GatewayError::Validation)?;

    let principal = effective_principal(&principal, &request);

    if request.stream {
        let inner = state.orchestrator.stream(&principal, &request).await?;
        let stream = build_sse_stream(state.clone(), principal, request, inner);
        return Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response());
    }

    let (_agent_name, response) = state.orchestrator.execute(&principal, &request).await?;
    let session_id =
        record_session(&state.sessions, &principal, &request, &response.content, &response.usage).await?;

    let wire = ChatCompletionResponse {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        object: ChatCompletionResponse::object_kind(),
        created: Utc::now().timestamp(),
        model: request.model.clone(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: MessageRole::Assistant,
                content: response.content,
            },
            finish_reason: response.finish_reason,
        }],
        usage: response.usage,
        system_fingerprint: Some(session_id),
    };
    Ok(Json(wire).into_response())
}
