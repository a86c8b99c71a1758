//! The session-store capability set (spec §4.9, C9), shaped after
//! `adk_session::SessionService`'s async trait.

use crate::types::{ChatSession, ListSessionsOptions, NewTurn, StoredMessage};
use async_trait::async_trait;
use gw_core::{GatewayError, OrgId, PrincipalId, SessionId};
use serde_json::Value;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(
        &self,
        user_id: &PrincipalId,
        org_id: &OrgId,
        agent_type: &str,
        title: Option<String>,
        metadata: Option<Value>,
    ) -> Result<SessionId, GatewayError>;

    /// Assigns sequential indices atomically; bumps `updated_at`/
    /// `last_message_at`; updates cumulative token counts. Errors with
    /// [`GatewayError::NotFound`] if the session does not exist.
    async fn append_messages(
        &self,
        session_id: &SessionId,
        turns: Vec<NewTurn>,
    ) -> Result<(), GatewayError>;

    /// Ordered by `last_message_at` descending; excludes archived unless
    /// `options.include_archived` is set.
    async fn list_sessions(
        &self,
        user_id: &PrincipalId,
        page: u32,
        page_size: u32,
        options: ListSessionsOptions,
    ) -> Result<(Vec<ChatSession>, u64, bool), GatewayError>;

    /// Errors with [`GatewayError::Forbidden`] when `session_id` is not
    /// owned by `requester` and `requester_is_admin` is false.
    async fn get_session(
        &self,
        session_id: &SessionId,
        requester: &PrincipalId,
        requester_is_admin: bool,
    ) -> Result<(ChatSession, Vec<StoredMessage>), GatewayError>;

    /// Soft-delete via `archived = true`.
    async fn archive(&self, session_id: &SessionId, user_id: &PrincipalId) -> Result<(), GatewayError>;
}
