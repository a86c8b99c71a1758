//! REST-backed [`SessionStore`] (spec §4.9, C9): talks to the relational
//! store's REST data-plane the same way `gw-audit::RestAuditWriter` talks
//! to the audit table, with an added per-session lock so `append_messages`
//! assigns gap-free indices under concurrent turns (spec §5).

use crate::error::SessionError;
use crate::store::SessionStore;
use crate::types::{ChatSession, ListSessionsOptions, NewTurn, StoredMessage};
use async_trait::async_trait;
use chrono::Utc;
use gw_core::{GatewayError, OrgId, PrincipalId, SessionId};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One row as the REST data-plane represents it. Field names match the
/// logical `chat_sessions` table in spec §6.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SessionRow {
    id: String,
    user_id: String,
    org_id: String,
    agent_type: String,
    title: Option<String>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    last_message_at: Option<chrono::DateTime<Utc>>,
    message_count: u32,
    prompt_tokens_total: u64,
    completion_tokens_total: u64,
    archived: bool,
    metadata: Value,
}

impl From<SessionRow> for ChatSession {
    fn from(row: SessionRow) -> Self {
        ChatSession {
            id: SessionId::from(row.id),
            user_id: PrincipalId::from(row.user_id),
            org_id: OrgId::from(row.org_id),
            agent_type: row.agent_type,
            title: row.title,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_message_at: row.last_message_at,
            message_count: row.message_count,
            prompt_tokens_total: row.prompt_tokens_total,
            completion_tokens_total: row.completion_tokens_total,
            archived: row.archived,
            metadata: row.metadata,
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct MessageRow {
    session_id: String,
    index: u32,
    role: gw_core::MessageRole,
    content: String,
    prompt_tokens: u32,
    completion_tokens: u32,
    created_at: chrono::DateTime<Utc>,
}

impl From<MessageRow> for StoredMessage {
    fn from(row: MessageRow) -> Self {
        StoredMessage {
            session_id: SessionId::from(row.session_id),
            index: row.index,
            role: row.role,
            content: row.content,
            prompt_tokens: row.prompt_tokens,
            completion_tokens: row.completion_tokens,
            created_at: row.created_at,
        }
    }
}

pub struct RestSessionStore {
    client: reqwest::Client,
    endpoint: String,
    credential: String,
    /// One lock per session id, so concurrent `append_messages` calls on
    /// the same session serialize (spec §4.9 consistency, §5 ordering).
    /// Lock-per-session rather than a single global lock: independent
    /// sessions append without contending each other.
    session_locks: dashmap::DashMap<SessionId, Arc<Mutex<()>>>,
}

impl RestSessionStore {
    pub fn new(rest_endpoint: impl Into<String>, service_role_credential: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: rest_endpoint.into(),
            credential: service_role_credential.into(),
            session_locks: dashmap::DashMap::new(),
        }
    }

    fn sessions_url(&self) -> String {
        format!("{}/chat_sessions", self.endpoint.trim_end_matches('/'))
    }

    fn session_url(&self, id: &SessionId) -> String {
        format!("{}?id=eq.{}", self.sessions_url(), id)
    }

    fn messages_url(&self) -> String {
        format!("{}/chat_messages", self.endpoint.trim_end_matches('/'))
    }

    fn lock_for(&self, id: &SessionId) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn fetch_row(&self, id: &SessionId) -> Result<Option<SessionRow>, SessionError> {
        let response = self
            .client
            .get(self.session_url(id))
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SessionError::Storage(format!(
                "session fetch failed with status {}",
                response.status()
            )));
        }
        let mut rows: Vec<SessionRow> = response
            .json()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        Ok(rows.pop())
    }
}

#[async_trait]
impl SessionStore for RestSessionStore {
    async fn create_session(
        &self,
        user_id: &PrincipalId,
        org_id: &OrgId,
        agent_type: &str,
        title: Option<String>,
        metadata: Option<Value>,
    ) -> Result<SessionId, GatewayError> {
        let id = SessionId::generate();
        let now = Utc::now();
        let row = SessionRow {
            id: id.to_string(),
            user_id: user_id.to_string(),
            org_id: org_id.to_string(),
            agent_type: agent_type.to_string(),
            title,
            created_at: now,
            updated_at: now,
            last_message_at: None,
            message_count: 0,
            prompt_tokens_total: 0,
            completion_tokens_total: 0,
            archived: false,
            metadata: metadata.unwrap_or(Value::Null),
        };

        let response = self
            .client
            .post(self.sessions_url())
            .bearer_auth(&self.credential)
            .json(&row)
            .send()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SessionError::Storage(format!(
                "session create failed with status {}",
                response.status()
            ))
            .into());
        }
        Ok(id)
    }

    async fn append_messages(
        &self,
        session_id: &SessionId,
        turns: Vec<NewTurn>,
    ) -> Result<(), GatewayError> {
        if turns.is_empty() {
            return Ok(());
        }
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let Some(row) = self.fetch_row(session_id).await? else {
            return Err(SessionError::NotFound(session_id.to_string()).into());
        };

        let mut next_index = row.message_count;
        let now = Utc::now();
        let mut prompt_total = row.prompt_tokens_total;
        let mut completion_total = row.completion_tokens_total;
        let mut message_rows = Vec::with_capacity(turns.len());

        for turn in turns {
            message_rows.push(MessageRow {
                session_id: session_id.to_string(),
                index: next_index,
                role: turn.role,
                content: turn.content,
                prompt_tokens: turn.prompt_tokens,
                completion_tokens: turn.completion_tokens,
                created_at: now,
            });
            prompt_total += turn.prompt_tokens as u64;
            completion_total += turn.completion_tokens as u64;
            next_index += 1;
        }

        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.credential)
            .json(&message_rows)
            .send()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SessionError::Storage(format!(
                "message append failed with status {}",
                response.status()
            ))
            .into());
        }

        let patch = serde_json::json!({
            "message_count": next_index,
            "prompt_tokens_total": prompt_total,
            "completion_tokens_total": completion_total,
            "updated_at": now,
            "last_message_at": now,
        });
        let response = self
            .client
            .patch(self.session_url(session_id))
            .bearer_auth(&self.credential)
            .json(&patch)
            .send()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SessionError::Storage(format!(
                "session counter update failed with status {}",
                response.status()
            ))
            .into());
        }
        Ok(())
    }

    async fn list_sessions(
        &self,
        user_id: &PrincipalId,
        page: u32,
        page_size: u32,
        options: ListSessionsOptions,
    ) -> Result<(Vec<ChatSession>, u64, bool), GatewayError> {
        let offset = page.saturating_mul(page_size);
        let mut url = format!(
            "{}?user_id=eq.{}&order=last_message_at.desc.nullslast&limit={}&offset={}",
            self.sessions_url(),
            user_id,
            page_size,
            offset,
        );
        if !options.include_archived {
            url.push_str("&archived=eq.false");
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.credential)
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SessionError::Storage(format!(
                "session list failed with status {}",
                response.status()
            ))
            .into());
        }
        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let rows: Vec<SessionRow> = response
            .json()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        let has_more = (offset as u64 + rows.len() as u64) < total;
        let sessions = rows.into_iter().map(ChatSession::from).collect();
        Ok((sessions, total, has_more))
    }

    async fn get_session(
        &self,
        session_id: &SessionId,
        requester: &PrincipalId,
        requester_is_admin: bool,
    ) -> Result<(ChatSession, Vec<StoredMessage>), GatewayError> {
        let Some(row) = self.fetch_row(session_id).await? else {
            return Err(SessionError::NotFound(session_id.to_string()).into());
        };
        if row.user_id != requester.to_string() && !requester_is_admin {
            return Err(SessionError::Forbidden(session_id.to_string()).into());
        }

        let url = format!(
            "{}?session_id=eq.{}&order=index.asc",
            self.messages_url(),
            session_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.credential)
            .send()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SessionError::Storage(format!(
                "message fetch failed with status {}",
                response.status()
            ))
            .into());
        }
        let rows: Vec<MessageRow> = response
            .json()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        let messages = rows.into_iter().map(StoredMessage::from).collect();
        Ok((ChatSession::from(row), messages))
    }

    async fn archive(&self, session_id: &SessionId, user_id: &PrincipalId) -> Result<(), GatewayError> {
        let Some(row) = self.fetch_row(session_id).await? else {
            return Err(SessionError::NotFound(session_id.to_string()).into());
        };
        if row.user_id != user_id.to_string() {
            return Err(SessionError::Forbidden(session_id.to_string()).into());
        }
        let patch = serde_json::json!({ "archived": true, "updated_at": Utc::now() });
        let response = self
            .client
            .patch(self.session_url(session_id))
            .bearer_auth(&self.credential)
            .json(&patch)
            .send()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SessionError::Storage(format!(
                "session archive failed with status {}",
                response.status()
            ))
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_url_filters_by_id() {
        let store = RestSessionStore::new("https://storage.example.com", "token");
        let id = SessionId::from("abc-123".to_string());
        assert_eq!(
            store.session_url(&id),
            "https://storage.example.com/chat_sessions?id=eq.abc-123"
        );
    }

    #[test]
    fn lock_for_returns_same_mutex_for_same_session() {
        let store = RestSessionStore::new("https://storage.example.com", "token");
        let id = SessionId::from("abc-123".to_string());
        let a = store.lock_for(&id);
        let b = store.lock_for(&id);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
