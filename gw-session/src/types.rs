//! Session and transcript types (spec §3 ChatSession, ChatMessage).

use chrono::{DateTime, Utc};
use gw_core::{MessageRole, OrgId, PrincipalId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub user_id: PrincipalId,
    pub org_id: OrgId,
    pub agent_type: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Monotonic; only ever incremented by `append_messages`.
    pub message_count: u32,
    pub prompt_tokens_total: u64,
    pub completion_tokens_total: u64,
    pub archived: bool,
    pub metadata: Value,
}

/// One persisted conversational turn. `(session_id, index)` is unique;
/// rows are append-only (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub session_id: SessionId,
    pub index: u32,
    pub role: MessageRole,
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub created_at: DateTime<Utc>,
}

/// A turn awaiting an index assignment from `append_messages`.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub role: MessageRole,
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ListSessionsOptions {
    pub include_archived: bool,
}
